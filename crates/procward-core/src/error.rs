use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Scanner error: {0}")]
    Scanner(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Terminate error: {0}")]
    Terminate(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_display() {
        let err = Error::Launch("C:\\apps\\app.exe: file not found".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Launch error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_terminate_error_display() {
        let err = Error::Terminate("process 4242 does not exist".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Terminate error"));
        assert!(msg.contains("4242"));
    }

    #[test]
    fn test_scanner_error_display() {
        let err = Error::Scanner("process table unavailable".to_string());
        assert!(format!("{}", err).contains("Scanner error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        let msg = format!("{}", err);
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(format!("{}", err).contains("JSON error"));
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(Error::Other("test error".to_string()));
        assert!(result.is_err());

        if let Err(e) = result {
            assert!(format!("{}", e).contains("test error"));
        }
    }
}
