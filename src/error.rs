/// Broad failure classes. Each maps to a distinct process exit code so
/// scripts driving `wpcal` can tell "no device" apart from "no data".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid CLI arguments or configuration.
    Usage,
    /// No sensor matched the configured resource.
    DeviceNotFound,
    /// A configure / rotate / measure call failed.
    DeviceIo,
    /// No persisted sweep exists for the requested run.
    StoreNotFound,
    /// Filesystem, CSV or JSON failure.
    Storage,
    /// The optimizer did not converge.
    FitConvergence,
    /// Sweep data unusable for fitting (too few points, non-finite values).
    InvalidData,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Usage => 2,
            ErrorKind::DeviceNotFound => 3,
            ErrorKind::DeviceIo => 4,
            ErrorKind::StoreNotFound => 5,
            ErrorKind::Storage => 6,
            ErrorKind::FitConvergence => 7,
            ErrorKind::InvalidData => 8,
        }
    }
}

#[derive(Clone, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, message)
    }

    pub fn device_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeviceIo, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::Usage,
            ErrorKind::DeviceNotFound,
            ErrorKind::DeviceIo,
            ErrorKind::StoreNotFound,
            ErrorKind::Storage,
            ErrorKind::FitConvergence,
            ErrorKind::InvalidData,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn display_is_the_message() {
        let err = AppError::new(ErrorKind::StoreNotFound, "no sweep for HWP1/20250101_000000");
        assert_eq!(err.to_string(), "no sweep for HWP1/20250101_000000");
        assert_eq!(err.kind(), ErrorKind::StoreNotFound);
        assert_eq!(err.exit_code(), 5);
    }
}
