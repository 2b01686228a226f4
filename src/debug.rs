use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// One plotted tick: raw reading, live filter output and whether a beat was
/// reported at this position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TracePoint {
    pub position: u64,
    pub raw: f32,
    pub filtered: f32,
    pub beat: bool,
}

pub fn write_gnuplot_data<W, F, T, O>(out: &mut W, data: &[T], mut fun: F) -> Result<()>
where
    W: Write,
    F: FnMut(&T) -> Vec<O>,
    O: fmt::Display,
{
    for d in data {
        let columns: Vec<String> = fun(d).iter().map(|c| c.to_string()).collect();
        writeln!(out, "{}", columns.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `position raw filtered beat` rows, plottable with
/// `plot "trace.dat" using 1:3 with lines, "" using 1:($4*$3) with points`.
pub fn write_trace<P: AsRef<Path>>(filename: P, trace: &[TracePoint]) -> Result<()> {
    let mut file = BufWriter::new(File::create(filename)?);
    write_gnuplot_data(&mut file, trace, |p| {
        vec![
            p.position.to_string(),
            p.raw.to_string(),
            p.filtered.to_string(),
            (p.beat as u8).to_string(),
        ]
    })
}
