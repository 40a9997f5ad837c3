// Defines the standard error codes from the gRPC spec.
// https://grpc.github.io/grpc/core/md_doc_statuscodes.html
// Errors in the load generator map onto these codes so that setup failures, transport failures
// and data errors can be told apart without matching on concrete types.
use std::error::Error;

#[cfg(feature = "tonic")]
mod tonic;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCodes {
    // OK is returned on success, we use "Success" since Ok is a keyword in Rust.
    Success = 0,
    // CANCELLED indicates the operation was cancelled (typically by the caller).
    Cancelled = 1,
    // UNKNOWN indicates an unknown error.
    Unknown = 2,
    // INVALID_ARGUMENT indicates client specified an invalid argument.
    InvalidArgument = 3,
    // DEADLINE_EXCEEDED means operation expired before completion.
    DeadlineExceeded = 4,
    // NOT_FOUND means some requested entity (e.g., a key) was not found.
    NotFound = 5,
    // ALREADY_EXISTS means an entity that we attempted to create already exists.
    AlreadyExists = 6,
    // PERMISSION_DENIED indicates the caller does not have permission to execute the operation.
    PermissionDenied = 7,
    // RESOURCE_EXHAUSTED indicates some resource has been exhausted.
    ResourceExhausted = 8,
    // FAILED_PRECONDITION indicates the system is not in a state required for the operation.
    FailedPrecondition = 9,
    // ABORTED indicates the operation was aborted.
    Aborted = 10,
    // OUT_OF_RANGE means operation was attempted past the valid range.
    OutOfRange = 11,
    // UNIMPLEMENTED indicates operation is not implemented or not supported/enabled.
    Unimplemented = 12,
    // INTERNAL errors are internal errors.
    Internal = 13,
    // UNAVAILABLE indicates service is currently unavailable.
    Unavailable = 14,
    // DATA_LOSS indicates unrecoverable data loss or corruption.
    DataLoss = 15,
    // UNAUTHENTICATED indicates the request does not have valid authentication credentials.
    Unauthenticated = 16,
}

impl ErrorCodes {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCodes::InvalidArgument => "InvalidArgumentError",
            ErrorCodes::NotFound => "NotFoundError",
            ErrorCodes::Internal => "InternalError",
            ErrorCodes::Unavailable => "UnavailableError",
            ErrorCodes::DeadlineExceeded => "DeadlineExceededError",
            _ => "RaftKvError",
        }
    }
}

pub trait RaftKvError: Error + Send {
    fn code(&self) -> ErrorCodes;
    fn boxed(self) -> Box<dyn RaftKvError>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
    fn should_trace_error(&self) -> bool {
        true
    }
}

impl Error for Box<dyn RaftKvError> {}

impl RaftKvError for Box<dyn RaftKvError> {
    fn code(&self) -> ErrorCodes {
        self.as_ref().code()
    }
}

impl RaftKvError for std::io::Error {
    fn code(&self) -> ErrorCodes {
        match self.kind() {
            std::io::ErrorKind::NotFound => ErrorCodes::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCodes::PermissionDenied,
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                ErrorCodes::InvalidArgument
            }
            _ => ErrorCodes::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_codes() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "trace.csv");
        assert_eq!(ErrorCodes::NotFound, err.code());
        let boxed: Box<dyn RaftKvError> = err.boxed();
        assert_eq!(ErrorCodes::NotFound, boxed.code());
        assert_eq!("NotFoundError", boxed.code().name());
    }

    #[test]
    fn unnamed_codes_fall_back_to_generic_name() {
        assert_eq!("UnavailableError", ErrorCodes::Unavailable.name());
        assert_eq!("RaftKvError", ErrorCodes::Cancelled.name());
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout");
        assert_eq!(ErrorCodes::Unknown, err.code());
        assert!(err.should_trace_error());
    }
}
