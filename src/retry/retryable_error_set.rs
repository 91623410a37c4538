use lazy_static::lazy_static;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    DoNotRetry,
}

/// Table of SQLSTATE prefixes and the decision to apply to matching codes.
///
/// A prefix is either an error class (the first two characters) or a full
/// code. The longest matching prefix wins, so a code entry overrides the
/// entry of its class. Codes not matching any prefix are not retried.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryableErrorSet {
    entries: Vec<(String, RetryDecision)>,
}

lazy_static! {
    static ref POSTGRES_RETRYABLE_ERRORS: RetryableErrorSet = RetryableErrorSet::new()
        // connection_exception
        .retry("08")
        // transaction_rollback: only serialization_failure is known to succeed on retry
        .do_not_retry("40")
        .retry("40001");
}

impl RetryableErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transient errors of PostgreSQL: connection exceptions and serialization failures.
    pub fn postgres() -> &'static RetryableErrorSet {
        &POSTGRES_RETRYABLE_ERRORS
    }

    pub fn retry<S: Into<String>>(self, prefix: S) -> Self {
        self.with_entry(prefix, RetryDecision::Retry)
    }

    pub fn do_not_retry<S: Into<String>>(self, prefix: S) -> Self {
        self.with_entry(prefix, RetryDecision::DoNotRetry)
    }

    pub fn with_entry<S: Into<String>>(mut self, prefix: S, decision: RetryDecision) -> Self {
        let prefix = prefix.into().to_ascii_uppercase();
        self.entries.retain(|(p, _)| p != &prefix);
        self.entries.push((prefix, decision));
        self
    }

    pub fn decision(&self, code: &str) -> RetryDecision {
        self.entries
            .iter()
            .filter(|(prefix, _)| {
                code.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(RetryDecision::DoNotRetry, |(_, decision)| *decision)
    }

    pub fn is_retryable(&self, code: &str) -> bool {
        self.decision(code) == RetryDecision::Retry
    }
}
