//! Tri-state operation results.

use crate::error::AsyncOpStateError;

/// The state of an operation that may still be running.
///
/// Exactly one of [`is_pending`](Self::is_pending),
/// [`is_success`](Self::is_success) and [`is_failure`](Self::is_failure)
/// holds. Combinators consume the op and build a new one.
///
/// ```
/// use modernidb::AsyncOp;
///
/// let op: AsyncOp<u32, String> = AsyncOp::Success(2);
/// assert_eq!(op.map(|n| n * 10).success(), Some(20));
///
/// let ops: Vec<AsyncOp<u32, String>> = vec![AsyncOp::Success(1), AsyncOp::Pending];
/// assert!(AsyncOp::fold(ops).is_pending());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AsyncOp<S, F> {
    /// Still in flight.
    #[default]
    Pending,
    /// Finished with a value.
    Success(S),
    /// Finished with a failure payload.
    Failure(F),
}

impl<S, F> AsyncOp<S, F> {
    /// Whether the op is still in flight.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the op succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the op failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The state's name: `"Pending"`, `"Success"` or `"Failure"`.
    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Success(_) => "Success",
            Self::Failure(_) => "Failure",
        }
    }

    /// The success value, if any.
    pub fn success(self) -> Option<S> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The failure payload, if any.
    pub fn failure(self) -> Option<F> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// The success value.
    ///
    /// # Errors
    ///
    /// [`AsyncOpStateError`] when pending or failed.
    pub fn value_or_err(self) -> Result<S, AsyncOpStateError> {
        let state = self.state_name();
        self.success().ok_or(AsyncOpStateError {
            accessed: "success",
            state,
        })
    }

    /// The failure payload.
    ///
    /// # Errors
    ///
    /// [`AsyncOpStateError`] when pending or succeeded.
    pub fn failure_or_err(self) -> Result<F, AsyncOpStateError> {
        let state = self.state_name();
        self.failure().ok_or(AsyncOpStateError {
            accessed: "failure",
            state,
        })
    }

    /// Borrows the contents.
    pub const fn as_ref(&self) -> AsyncOp<&S, &F> {
        match self {
            Self::Pending => AsyncOp::Pending,
            Self::Success(value) => AsyncOp::Success(value),
            Self::Failure(failure) => AsyncOp::Failure(failure),
        }
    }

    /// Maps the success value.
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> AsyncOp<T, F> {
        match self {
            Self::Pending => AsyncOp::Pending,
            Self::Success(value) => AsyncOp::Success(f(value)),
            Self::Failure(failure) => AsyncOp::Failure(failure),
        }
    }

    /// Maps the failure payload.
    pub fn map_failure<G>(self, f: impl FnOnce(F) -> G) -> AsyncOp<S, G> {
        match self {
            Self::Pending => AsyncOp::Pending,
            Self::Success(value) => AsyncOp::Success(value),
            Self::Failure(failure) => AsyncOp::Failure(f(failure)),
        }
    }

    /// Chains another op onto a success. Pending and failed ops pass
    /// through.
    pub fn flat_map<T>(self, f: impl FnOnce(S) -> AsyncOp<T, F>) -> AsyncOp<T, F> {
        match self {
            Self::Pending => AsyncOp::Pending,
            Self::Success(value) => f(value),
            Self::Failure(failure) => AsyncOp::Failure(failure),
        }
    }

    /// Collapses the op into one value.
    pub fn unpack<R>(
        self,
        on_success: impl FnOnce(S) -> R,
        on_failure: impl FnOnce(F) -> R,
        on_pending: impl FnOnce() -> R,
    ) -> R {
        match self {
            Self::Pending => on_pending(),
            Self::Success(value) => on_success(value),
            Self::Failure(failure) => on_failure(failure),
        }
    }

    /// Folds ops into one.
    ///
    /// All successes give a success with every value in order; otherwise the
    /// first failure wins; otherwise the result is pending. No ops at all is
    /// a success with an empty vector.
    pub fn fold(ops: impl IntoIterator<Item = Self>) -> AsyncOp<Vec<S>, F> {
        let mut values = Vec::new();
        let mut pending = false;
        for op in ops {
            match op {
                Self::Success(value) => values.push(value),
                Self::Failure(failure) => return AsyncOp::Failure(failure),
                Self::Pending => pending = true,
            }
        }
        if pending {
            AsyncOp::Pending
        } else {
            AsyncOp::Success(values)
        }
    }

    /// Folds two ops with different success types.
    pub fn fold2<T>(first: Self, second: AsyncOp<T, F>) -> AsyncOp<(S, T), F> {
        match (first, second) {
            (Self::Failure(failure), _) | (_, AsyncOp::Failure(failure)) => {
                AsyncOp::Failure(failure)
            }
            (Self::Success(a), AsyncOp::Success(b)) => AsyncOp::Success((a, b)),
            _ => AsyncOp::Pending,
        }
    }
}

impl<S, F> From<Result<S, F>> for AsyncOp<S, F> {
    fn from(result: Result<S, F>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}
