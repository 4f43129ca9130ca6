//! Consumer-defined completion logic.

use crate::error::Result;
use crate::request::Request;

/// Completion hook invoked by the ledger once the relayer is authenticated
/// and the request is known to be Pending.
///
/// The hook decides what lands in the record: it returns the value to store,
/// or an error to reject the completion. The ledger applies the
/// Pending→Completed transition itself.
pub trait CompletionHandler: Send + 'static {
    fn complete(&mut self, request: &Request, result: &str) -> Result<String>;
}

/// Default consumer: stores the relayer's value verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreResult;

impl CompletionHandler for StoreResult {
    fn complete(&mut self, _request: &Request, result: &str) -> Result<String> {
        Ok(result.to_string())
    }
}

/// Consumer that keeps at most `precision` decimal places of a numeric result.
///
/// Non-numeric results (never produced by the relay) are stored unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RoundedResult {
    pub precision: usize,
}

impl CompletionHandler for RoundedResult {
    fn complete(&mut self, _request: &Request, result: &str) -> Result<String> {
        Ok(match result.parse::<f64>() {
            Ok(value) => format!("{:.*}", self.precision, value),
            Err(_) => result.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::request::RequestId;

    fn pending() -> Request {
        Request::pending(RequestId::derive(1, &Address::ZERO, 0), 40, -74)
    }

    #[test]
    fn store_result_is_verbatim() {
        assert_eq!(StoreResult.complete(&pending(), "21.5").unwrap(), "21.5");
    }

    #[test]
    fn rounded_result_formats_numbers_only() {
        let mut handler = RoundedResult { precision: 1 };
        assert_eq!(handler.complete(&pending(), "21.56").unwrap(), "21.6");
        assert_eq!(handler.complete(&pending(), "-3").unwrap(), "-3.0");
        assert_eq!(handler.complete(&pending(), "n/a").unwrap(), "n/a");
    }
}
