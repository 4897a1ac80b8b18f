//! Outbound notifications to whoever triggered a lifecycle operation.

use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;

use tracing::info;

use crate::model::RequesterChannel;

/// Boxed future returned by [`Notifier::notify`].
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Delivers a text message to a requester channel.
///
/// Delivery is best-effort; implementations log their own failures.
pub trait Notifier: Send + Sync {
    /// Sends `text` to `channel`.
    fn notify<'a>(&'a self, channel: &'a RequesterChannel, text: &'a str) -> NotifyFuture<'a>;
}

/// Prints notifications to standard output as `[channel] text`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify<'a>(&'a self, channel: &'a RequesterChannel, text: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            info!(%channel, text, "notification");
            writeln!(io::stdout().lock(), "[{channel}] {text}").ok();
        })
    }
}
