use core::error::Error;

/// Admin API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
    #[display("Failed to encode metrics: {message}")]
    MetricsEncoding { message: String },
}

impl Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_formatting() {
        let server_error = ApiError::ServerError {
            message: "address in use".to_string(),
        };
        assert_eq!(server_error.to_string(), "Server error: address in use");

        let encoding = ApiError::MetricsEncoding {
            message: "bad label".to_string(),
        };
        assert_eq!(encoding.to_string(), "Failed to encode metrics: bad label");
    }
}
