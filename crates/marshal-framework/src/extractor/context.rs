use tokio_util::sync::CancellationToken;

use crate::error::ExtractResult;
use crate::extractor::{ExtractCx, FromInvocation};

/// Identity of whoever issued the request, if the host set one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<String>);

impl FromInvocation for Caller {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(Caller(cx.context().caller().map(str::to_string)))
    }
}

/// The request's cancellation token.
///
/// Long-running handlers should select on [`CancellationToken::cancelled`].
#[derive(Debug, Clone)]
pub struct Cancellation(pub CancellationToken);

impl FromInvocation for Cancellation {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(Cancellation(cx.context().cancellation().clone()))
    }
}

/// Name of the command being invoked (its alias path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPath(pub String);

impl FromInvocation for CommandPath {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(CommandPath(cx.command().to_string()))
    }
}
