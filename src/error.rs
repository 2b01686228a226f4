use std::io;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "invalid configuration: {}", reason)]
    Config { reason: String },

    #[fail(display = "unable to design band-pass filter: {}", reason)]
    Filter { reason: String },

    #[fail(display = "session is not running")]
    NotRunning,

    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),

    #[fail(display = "malformed configuration file: {}", _0)]
    Json(#[cause] serde_json::Error),
}

impl Error {
    pub fn config<S: Into<String>>(reason: S) -> Error {
        Error::Config {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
