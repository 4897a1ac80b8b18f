//! Shell snippets that drive the game process inside a `screen` session.

use shell_escape::unix::escape;

use super::ShellConfig;

const PRESENT_MARKER: &str = "session-present";
const ABSENT_MARKER: &str = "session-absent";

/// Builds the remote commands used to launch, stop, and inspect the game.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameScripts {
    session: String,
    server_dir: String,
    launch_command: String,
    stop_command: String,
}

impl GameScripts {
    /// Builds scripts from shell settings and the in-game stop command.
    #[must_use]
    pub fn new(config: &ShellConfig, stop_command: &str) -> Self {
        Self {
            session: config.session_name.clone(),
            server_dir: config.server_dir.clone(),
            launch_command: config.launch_command.clone(),
            stop_command: stop_command.to_owned(),
        }
    }

    /// Returns the in-game command that saves and stops the server.
    #[must_use]
    pub fn console_stop_command(&self) -> &str {
        &self.stop_command
    }

    /// Starts the game detached inside its `screen` session.
    #[must_use]
    pub fn launch(&self) -> String {
        format!(
            "cd {} && screen -dmS {} {}",
            render_dir(&self.server_dir),
            self.session,
            self.launch_command
        )
    }

    /// Types the stop command into the game's console window.
    #[must_use]
    pub fn stop_signal(&self) -> String {
        let keystrokes = format!("{}^M", self.stop_command);
        format!(
            "screen -S {} -p 0 -X stuff {}",
            self.session,
            escape(keystrokes.into())
        )
    }

    /// Tears the session down without letting the game save.
    #[must_use]
    pub fn force_kill(&self) -> String {
        format!("screen -S {} -X quit", self.session)
    }

    /// Prints a marker telling whether the session still exists.
    ///
    /// A marker is used instead of the exit status so that an SSH failure is
    /// never mistaken for an absent session.
    #[must_use]
    pub fn session_probe(&self) -> String {
        format!(
            "if screen -list | grep -Eq '[0-9]+[.]{}[[:space:]]'; then echo {PRESENT_MARKER}; else echo {ABSENT_MARKER}; fi",
            self.session
        )
    }
}

/// Interprets the output of [`GameScripts::session_probe`].
///
/// Returns `None` when neither marker is present.
#[must_use]
pub fn parse_session_probe(output: &str) -> Option<bool> {
    if output.contains(ABSENT_MARKER) {
        Some(false)
    } else if output.contains(PRESENT_MARKER) {
        Some(true)
    } else {
        None
    }
}

fn render_dir(dir: &str) -> String {
    if dir == "~" {
        return String::from("\"$HOME\"");
    }
    dir.strip_prefix("~/").map_or_else(
        || escape(dir.into()).into_owned(),
        |rest| format!("\"$HOME\"/{}", escape(rest.into())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::config::sample_config;
    use rstest::rstest;

    fn scripts() -> GameScripts {
        GameScripts::new(&sample_config(), "stop")
    }

    #[test]
    fn launch_runs_detached_in_server_dir() {
        assert_eq!(
            scripts().launch(),
            "cd \"$HOME\"/minecraft && screen -dmS minecraft ./run.sh"
        );
    }

    #[test]
    fn launch_quotes_absolute_dirs_with_spaces() {
        let mut config = sample_config();
        config.server_dir = String::from("/srv/game server");
        let launch = GameScripts::new(&config, "stop").launch();
        assert!(launch.starts_with("cd '/srv/game server' && "), "{launch}");
    }

    #[test]
    fn stop_signal_types_command_with_carriage_return() {
        assert_eq!(
            scripts().stop_signal(),
            "screen -S minecraft -p 0 -X stuff 'stop^M'"
        );
    }

    #[test]
    fn force_kill_quits_session() {
        assert_eq!(scripts().force_kill(), "screen -S minecraft -X quit");
    }

    #[rstest]
    #[case("session-absent\n", Some(false))]
    #[case("session-present\n", Some(true))]
    #[case("ssh: connect to host refused", None)]
    #[case("", None)]
    fn session_probe_output_is_interpreted(#[case] output: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_session_probe(output), expected);
    }

    #[test]
    fn session_probe_mentions_session_name() {
        assert!(scripts().session_probe().contains("[.]minecraft[[:space:]]"));
    }
}
