//! Combined status reporting.
//!
//! [`aggregate`] is a pure function over already-gathered inputs;
//! [`StatusAggregator::collect`] gathers them. Neither writes any state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::channel::CommandChannel;
use crate::compute::{ComputeBackend, ComputeStatus};
use crate::console::{LIST_COMMAND, parse_player_list};
use crate::model::{InstanceState, PlayerSample, RequesterChannel, SampleSource};
use crate::probe::StatusProbe;
use crate::state_store::{RequesterStore, load_requester};

/// One consolidated view of the instance and the game.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatusReport {
    /// Lifecycle state.
    pub state: InstanceState,
    /// Provider label or failure description.
    pub compute: String,
    /// Latest player sample, when one could be taken.
    pub players: Option<PlayerSample>,
    /// Who requested the last start.
    pub requester: Option<RequesterChannel>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Server: {} (provider: {})", self.state, self.compute)?;
        match &self.players {
            Some(sample) => writeln!(f, "Players: {sample}")?,
            None => writeln!(f, "Players: unknown")?,
        }
        match &self.requester {
            Some(requester) => write!(f, "Last started from: {requester}"),
            None => write!(f, "Last started from: nobody on record"),
        }
    }
}

/// Builds a report from gathered inputs.
#[must_use]
pub fn aggregate(
    compute: &ComputeStatus,
    players: Option<PlayerSample>,
    requester: Option<RequesterChannel>,
) -> StatusReport {
    StatusReport {
        state: compute.state,
        compute: compute.label.clone(),
        players,
        requester,
    }
}

/// Takes a player sample, preferring the console over the probe.
#[derive(Clone)]
pub struct PlayerSampler {
    console: Arc<dyn CommandChannel>,
    probe: Arc<dyn StatusProbe>,
    command_timeout: Duration,
    probe_timeout: Duration,
}

impl PlayerSampler {
    /// Builds a sampler over the console and the probe.
    #[must_use]
    pub fn new(
        console: Arc<dyn CommandChannel>,
        probe: Arc<dyn StatusProbe>,
        command_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            console,
            probe,
            command_timeout,
            probe_timeout,
        }
    }

    /// Returns the current player count, or `None` when neither source can
    /// produce one.
    pub async fn sample(&self) -> Option<PlayerSample> {
        if self.console.is_available() {
            match self.console.execute(LIST_COMMAND, self.command_timeout).await {
                Ok(result) if result.succeeded => {
                    if let Some(count) = parse_player_list(&result.output) {
                        return Some(PlayerSample::now(
                            count.online,
                            Some(count.max),
                            SampleSource::Rcon,
                        ));
                    }
                    debug!(reply = %result.output, "player list not recognised");
                }
                Ok(result) => warn!(error = ?result.error, "player list command failed"),
                Err(err) => warn!(%err, "player list unavailable over the console"),
            }
        }

        if !self.probe.is_configured() {
            return None;
        }
        match self.probe.probe(self.probe_timeout).await {
            Ok(status) => Some(PlayerSample::now(
                status.online,
                Some(status.max),
                SampleSource::NetworkProbe,
            )),
            Err(err) => {
                debug!(%err, "probe produced no sample");
                None
            }
        }
    }
}

/// Gathers live inputs for a [`StatusReport`].
#[derive(Clone)]
pub struct StatusAggregator {
    compute: Arc<dyn ComputeBackend>,
    sampler: PlayerSampler,
    store: Arc<dyn RequesterStore>,
}

impl StatusAggregator {
    /// Builds an aggregator.
    #[must_use]
    pub fn new(
        compute: Arc<dyn ComputeBackend>,
        sampler: PlayerSampler,
        store: Arc<dyn RequesterStore>,
    ) -> Self {
        Self {
            compute,
            sampler,
            store,
        }
    }

    /// Queries the provider, samples players when running, and reads the
    /// stored requester.
    pub async fn collect(&self) -> StatusReport {
        let compute = match self.compute.describe().await {
            Ok(status) => status,
            Err(err) => ComputeStatus {
                state: InstanceState::Unknown,
                label: format!("unavailable: {err}"),
            },
        };
        let players = if compute.state == InstanceState::Running {
            self.sampler.sample().await
        } else {
            None
        };
        let requester = load_requester(&self.store).await.unwrap_or_else(|err| {
            warn!(%err, "could not read the stored requester");
            None
        });
        aggregate(&compute, players, requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::state_store::MemoryRequesterStore;
    use crate::test_support::{FakeCompute, ScriptedChannel, ScriptedProbe};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn sampler(console: &Arc<ScriptedChannel>, probe: &Arc<ScriptedProbe>) -> PlayerSampler {
        PlayerSampler::new(console.clone(), probe.clone(), TIMEOUT, TIMEOUT)
    }

    #[test]
    fn aggregate_copies_inputs() {
        let sample = PlayerSample::now(2, Some(10), SampleSource::Rcon);
        let report = aggregate(
            &ComputeStatus::from_label("running"),
            Some(sample.clone()),
            Some(RequesterChannel::from("chan-a")),
        );

        assert_eq!(report.state, InstanceState::Running);
        assert_eq!(report.compute, "running");
        assert_eq!(report.players, Some(sample));
        let rendered = report.to_string();
        assert!(rendered.contains("Server: running"));
        assert!(rendered.contains("Players: 2/10 (RCON)"));
        assert!(rendered.contains("Last started from: chan-a"));
    }

    #[test]
    fn aggregate_renders_unknowns() {
        let report = aggregate(&ComputeStatus::from_label("stopped"), None, None);
        let rendered = report.to_string();
        assert!(rendered.contains("Players: unknown"));
        assert!(rendered.contains("nobody on record"));
    }

    #[tokio::test]
    async fn console_count_wins_over_probe() {
        let console = Arc::new(ScriptedChannel::available(ChannelKind::GameConsole));
        console.respond_to("list", "There are 4 of a max of 20 players online: a, b, c, d");
        let probe = Arc::new(ScriptedProbe::online(9));

        let sample = sampler(&console, &probe).sample().await;

        assert!(matches!(sample, Some(PlayerSample { count: 4, source: SampleSource::Rcon, .. })));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn unparsable_console_reply_falls_back_to_probe() {
        let console = Arc::new(ScriptedChannel::available(ChannelKind::GameConsole));
        console.respond_to("list", "Unknown command");
        let probe = Arc::new(ScriptedProbe::online(1));

        let sample = sampler(&console, &probe).sample().await;

        assert!(matches!(
            sample,
            Some(PlayerSample { count: 1, source: SampleSource::NetworkProbe, .. })
        ));
    }

    #[tokio::test]
    async fn disabled_console_is_not_invoked() {
        let console = Arc::new(ScriptedChannel::unavailable(ChannelKind::GameConsole));
        let probe = Arc::new(ScriptedProbe::offline());

        assert_eq!(sampler(&console, &probe).sample().await, None);
        assert!(console.commands().is_empty());
    }

    #[tokio::test]
    async fn collect_skips_sampling_when_stopped() {
        let compute = Arc::new(FakeCompute::stopped());
        let console = Arc::new(ScriptedChannel::available(ChannelKind::GameConsole));
        let probe = Arc::new(ScriptedProbe::online(3));
        let store = Arc::new(MemoryRequesterStore::with_requester(RequesterChannel::from(
            "chan-a",
        )));

        let report = StatusAggregator::new(compute, sampler(&console, &probe), store)
            .collect()
            .await;

        assert_eq!(report.state, InstanceState::Stopped);
        assert_eq!(report.players, None);
        assert_eq!(report.requester, Some(RequesterChannel::from("chan-a")));
        assert!(console.commands().is_empty());
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn collect_reports_provider_failures_as_unknown() {
        let compute = Arc::new(FakeCompute::unconfigured());
        let console = Arc::new(ScriptedChannel::unavailable(ChannelKind::GameConsole));
        let probe = Arc::new(ScriptedProbe::unconfigured());

        let report = StatusAggregator::new(
            compute,
            sampler(&console, &probe),
            Arc::new(MemoryRequesterStore::new()),
        )
        .collect()
        .await;

        assert_eq!(report.state, InstanceState::Unknown);
        assert!(report.compute.starts_with("unavailable: compute backend is not configured"));
    }
}
