/// Recommended error type for your scenario `main` function and any shared code that you write for
/// discovery stages or requesters. Use `?` to propagate errors.
pub type ChainTunnelResult<T> = anyhow::Result<T>;
