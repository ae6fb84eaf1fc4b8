/// Lifecycle of one asynchronous request as seen by a view.
///
/// Shared by the pollers (per fetch cycle) and the action orchestrator (per
/// invocation) so both report loading and errors the same way.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Op<T, E = String> {
    #[default]
    Idle,
    Pending,
    Success(T),
    Failure(E),
}

impl<T, E> Op<T, E> {
    pub fn settle(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Op::Success(value),
            Err(err) => Op::Failure(err),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Op::Pending)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Op::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            Op::Failure(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Op;

    #[test]
    fn settle_maps_both_arms() {
        let ok: Op<u8> = Op::settle(Ok(3));
        assert_eq!(ok.success(), Some(&3));
        assert!(ok.failure().is_none());

        let err: Op<u8> = Op::settle(Err("boom".to_string()));
        assert_eq!(err.failure().map(String::as_str), Some("boom"));
        assert!(!err.is_pending());
    }
}
