use super::error::Error;
use std::fmt;

/// Three-valued outcome counted by the benchmark harness.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Status {
    Ok,
    NotFound,
    Error,
}

impl Status {
    pub fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(err) if err.is_not_found() => Status::NotFound,
            Err(_) => Status::Error,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::Error => "ERROR",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
