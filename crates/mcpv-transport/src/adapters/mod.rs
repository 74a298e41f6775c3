//! Concrete [`crate::traits::Transport`] adapters.

pub mod http;
pub mod stdio;

use mcpv_types::spec::{ServerSpec, Transport as SpecTransport};

use crate::traits::Transport;

/// Pick the adapter matching a spec's declared transport kind.
#[must_use]
pub fn for_spec(spec: &ServerSpec) -> Box<dyn Transport> {
    match &spec.transport {
        SpecTransport::Stdio { .. } => Box::new(stdio::StdioTransport),
        SpecTransport::StreamableHttp { .. } => Box::new(http::HttpTransport),
    }
}
