// Wire layout of a sensor notification: a run of 8 byte groups, each holding
// a little-endian u32 tick counter followed by a little-endian f32 reading.

use byteorder::{ByteOrder, LittleEndian};

pub const SAMPLE_BYTES: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: u32,
    pub value: f32,
}

impl Sample {
    pub fn new(timestamp: u32, value: f32) -> Sample {
        Sample {
            timestamp: timestamp,
            value: value,
        }
    }
}

/// Decodes every complete group in `data`, in buffer order. A trailing
/// partial group is dropped.
pub fn decode(data: &[u8]) -> Vec<Sample> {
    let chunks = data.chunks_exact(SAMPLE_BYTES);
    let rest = chunks.remainder().len();
    if rest != 0 {
        debug!("dropping {} trailing bytes of a {} byte packet", rest, data.len());
    }
    chunks
        .map(|group| {
            Sample::new(
                LittleEndian::read_u32(&group[..4]),
                LittleEndian::read_f32(&group[4..]),
            )
        })
        .collect()
}

pub fn encode(samples: &[Sample]) -> Vec<u8> {
    let mut wrt = vec![0u8; samples.len() * SAMPLE_BYTES];

    for (d, group) in samples.iter().zip(wrt.chunks_exact_mut(SAMPLE_BYTES)) {
        LittleEndian::write_u32(&mut group[..4], d.timestamp);
        LittleEndian::write_f32(&mut group[4..], d.value);
    }
    wrt
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(1000 + i as u32, (i as f32 * 0.37).sin()))
            .collect()
    }

    #[test]
    fn test_known_layout() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x80, 0x3f];
        let decoded = decode(&data);
        assert_eq!(decoded, vec![Sample::new(0x0201, 1.0)]);
    }

    #[test]
    fn test_round_trip() {
        let original = samples(32);
        let decoded = decode(&encode(&original));
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_empty_packet() {
        assert!(decode(&[]).is_empty());
        assert!(decode(&[1, 2, 3]).is_empty());
    }

    proptest! {
        #[test]
        fn test_partial_group_is_dropped(n in 0usize..40, r in 1usize..8) {
            let original = samples(n);
            let mut data = encode(&original);
            data.extend(std::iter::repeat(0xAB).take(r));
            prop_assert_eq!(decode(&data), original);
        }
    }
}
