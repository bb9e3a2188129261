/// Classification for failover policy.
///
/// Used by the coordinator to decide how to react to a failed source attempt.
/// Failover only ever moves to the next source; the same source is never
/// re-queried within one `get_quote` call.
///
/// # Behavior Summary
///
/// | Class | Try Next Source? | Record Circuit Breaker Failure? |
/// |-------|------------------|---------------------------------|
/// | `Never` | No | No |
/// | `FailoverWithPenalty` | Yes | Yes |
/// | `NextProvider` | Yes | No |
/// | `CircuitOpen` | Yes (skip this one) | No (already recorded) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal for the whole call.
    Never,

    /// Failover to the next source and record a circuit breaker penalty.
    ///
    /// Used for transport errors, timeouts, provider-side 429s and prices
    /// rejected by the validator. Enough of these open the source's circuit.
    FailoverWithPenalty,

    /// Try the next source without recording any penalty.
    ///
    /// Used when the source simply does not list the symbol.
    NextProvider,

    /// Circuit breaker is open for this source.
    CircuitOpen,
}
