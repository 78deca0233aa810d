use thiserror::Error;

/// Errors surfaced by the simulator's I/O and device layers.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad grid file: {0}")]
    GridFormat(String),

    #[error("no GPU adapter with f64 shader support")]
    NoAdapter,

    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    #[error("device read-back failed: {0}")]
    ReadBack(String),

    #[error("bad configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_layer() {
        let e = SimError::GridFormat("bad magic".into());
        assert_eq!(e.to_string(), "bad grid file: bad magic");
        assert!(SimError::NoAdapter.to_string().contains("f64"));

        let io: SimError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(io.to_string().starts_with("i/o error"));
    }
}
