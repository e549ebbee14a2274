//! TTS backend and audio player discovery.
//!
//! Engines and players are located the same way, probing in order:
//!
//! 1. the executable search path (`PATH`) for each candidate name
//! 2. a fixed list of well-known install directories
//! 3. the `which` utility run as a subprocess, bounded by a timeout
//!
//! The first hit wins. No engine is not an error: the speech manager then runs
//! in log-only mode. A player is only looked for when the engine can write
//! WAV output (espeak family), and decides the [`SpeakStrategy`]:
//!
//! ```text
//!  espeak + aplay/paplay/play  -> Pipeline   engine --stdout | player
//!  espeak + other player       -> WavFile    engine -w x.wav ; player x.wav
//!  anything else               -> Direct     engine <text>
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use voxwatch_core::SpeechConfig;

/// Candidate engine names, most preferred first.
pub const DEFAULT_CANDIDATES: &[&str] = &["espeak-ng", "espeak", "spd-say", "say"];

/// Candidate audio player names, most preferred first.
pub const DEFAULT_PLAYERS: &[&str] = &["aplay", "paplay", "play"];

/// Install directories searched when the search path has no candidate.
pub const WELL_KNOWN_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/snap/bin",
    "/opt/homebrew/bin",
    "/opt/local/bin",
];

/// Upper bound on one `which` subprocess.
pub const WHICH_TIMEOUT: Duration = Duration::from_secs(2);

const ESPEAK_VOICE: &[&str] = &["-v", "en", "-s", "160", "-p", "50", "-a", "180"];

/// Argument template family, chosen by executable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    EspeakNg,
    Espeak,
    SpdSay,
    Say,
    /// Unrecognized executable; receives the text as its only argument
    Generic,
}

impl BackendKind {
    /// Classify an executable by its file name.
    pub fn from_path(path: &Path) -> Self {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("espeak-ng") => Self::EspeakNg,
            Some("espeak") => Self::Espeak,
            Some("spd-say") => Self::SpdSay,
            Some("say") => Self::Say,
            _ => Self::Generic,
        }
    }

    /// Whether the engine can write WAV to stdout or a file.
    pub fn is_espeak(&self) -> bool {
        matches!(self, Self::EspeakNg | Self::Espeak)
    }

    /// Command-line arguments that speak `text` through the engine's own audio output.
    pub fn args(&self, text: &str) -> Vec<String> {
        let flags: &[&str] = match self {
            Self::EspeakNg | Self::Espeak => ESPEAK_VOICE,
            Self::Say => &["-v", "Samantha", "-r", "180"],
            Self::SpdSay => &["-w", "-r", "10"],
            Self::Generic => &[],
        };
        flags
            .iter()
            .map(|f| f.to_string())
            .chain(std::iter::once(text.to_string()))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EspeakNg => "espeak-ng",
            Self::Espeak => "espeak",
            Self::SpdSay => "spd-say",
            Self::Say => "say",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio player family, chosen by executable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    /// ALSA `aplay`
    Aplay,
    /// PulseAudio `paplay`
    Paplay,
    /// SoX `play`
    Sox,
    /// Anything else; only plays files
    Other,
}

impl PlayerKind {
    pub fn from_path(path: &Path) -> Self {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("aplay") => Self::Aplay,
            Some("paplay") => Self::Paplay,
            Some("play") => Self::Sox,
            _ => Self::Other,
        }
    }

    /// Whether the player accepts WAV on stdin.
    pub fn reads_stdin(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Arguments for playing WAV from stdin.
    pub fn stdin_args(&self) -> &'static [&'static str] {
        match self {
            Self::Aplay => &["-q"],
            Self::Sox => &["-q", "-t", "wav", "-"],
            Self::Paplay | Self::Other => &[],
        }
    }

    /// Arguments for playing the WAV file at `wav`.
    pub fn file_args(&self, wav: &Path) -> Vec<OsString> {
        let quiet: &[&str] = match self {
            Self::Aplay | Self::Sox => &["-q"],
            Self::Paplay | Self::Other => &[],
        };
        quiet
            .iter()
            .map(OsString::from)
            .chain(std::iter::once(wav.as_os_str().to_owned()))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aplay => "aplay",
            Self::Paplay => "paplay",
            Self::Sox => "sox",
            Self::Other => "other",
        }
    }
}

/// A resolved audio player executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPlayer {
    path: PathBuf,
    kind: PlayerKind,
}

impl AudioPlayer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = PlayerKind::from_path(&path);
        Self { path, kind }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }
}

impl fmt::Display for AudioPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind.as_str())
    }
}

/// How an utterance reaches the speakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStrategy {
    /// Engine writes WAV to stdout, piped straight into the player.
    Pipeline,
    /// Engine renders a temporary WAV file, then the player plays it.
    WavFile,
    /// Engine plays the audio itself.
    Direct,
}

impl SpeakStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::WavFile => "wav-file",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for SpeakStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unspawned commands for one utterance.
#[derive(Debug)]
pub enum SpeechPlan {
    Direct(Command),
    Pipeline { engine: Command, player: Command },
    WavFile { engine: Command, player: Command, wav: PathBuf },
}

/// A resolved TTS engine, optionally paired with an audio player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsBackend {
    path: PathBuf,
    kind: BackendKind,
    player: Option<AudioPlayer>,
}

impl TtsBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = BackendKind::from_path(&path);
        Self {
            path,
            kind,
            player: None,
        }
    }

    /// Pair the engine with an audio player.
    pub fn with_player(mut self, player: AudioPlayer) -> Self {
        self.player = Some(player);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn player(&self) -> Option<&AudioPlayer> {
        self.player.as_ref()
    }

    pub fn strategy(&self) -> SpeakStrategy {
        match &self.player {
            Some(player) if self.kind.is_espeak() && player.kind.reads_stdin() => {
                SpeakStrategy::Pipeline
            }
            Some(_) if self.kind.is_espeak() => SpeakStrategy::WavFile,
            _ => SpeakStrategy::Direct,
        }
    }

    /// Arguments for speaking `text` directly with this engine.
    pub fn args(&self, text: &str) -> Vec<String> {
        self.kind.args(text)
    }

    /// Build the commands that speak `text`. `wav` is only used by
    /// [`SpeakStrategy::WavFile`] and must not exist yet.
    pub fn plan(&self, text: &str, wav: &Path) -> SpeechPlan {
        let player = match (&self.player, self.strategy()) {
            (Some(player), SpeakStrategy::Pipeline | SpeakStrategy::WavFile) => player,
            _ => {
                let mut engine = Command::new(&self.path);
                engine.args(self.args(text));
                return SpeechPlan::Direct(engine);
            }
        };

        let mut engine = Command::new(&self.path);
        let mut play = Command::new(&player.path);

        if player.kind.reads_stdin() {
            engine.arg("--stdout").args(ESPEAK_VOICE).arg(text);
            play.args(player.kind.stdin_args());
            SpeechPlan::Pipeline {
                engine,
                player: play,
            }
        } else {
            engine.args(ESPEAK_VOICE).arg("-w").arg(wav).arg(text);
            play.args(player.kind.file_args(wav));
            SpeechPlan::WavFile {
                engine,
                player: play,
                wav: wav.to_path_buf(),
            }
        }
    }
}

impl fmt::Display for TtsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)?;
        match (&self.player, self.strategy()) {
            (Some(player), SpeakStrategy::Pipeline) => write!(f, " | {player}"),
            (Some(player), SpeakStrategy::WavFile) => write!(f, " -> {player}"),
            _ => Ok(()),
        }
    }
}

/// Configurable engine and player search.
///
/// The defaults search the real system. Tests narrow the search with
/// [`with_search_path`](Self::with_search_path) and friends.
#[derive(Debug, Clone)]
pub struct BackendDiscovery {
    candidates: Vec<String>,
    players: Vec<String>,
    well_known_dirs: Vec<PathBuf>,
    search_path: Option<OsString>,
    which_program: Option<PathBuf>,
    which_timeout: Duration,
}

impl Default for BackendDiscovery {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            players: DEFAULT_PLAYERS.iter().map(|s| s.to_string()).collect(),
            well_known_dirs: WELL_KNOWN_DIRS.iter().map(PathBuf::from).collect(),
            search_path: None,
            which_program: Some(PathBuf::from("which")),
            which_timeout: WHICH_TIMEOUT,
        }
    }
}

impl BackendDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the engine candidate names.
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the audio player candidate names.
    pub fn with_players<I, S>(mut self, players: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.players = players.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the well-known install directories.
    pub fn with_well_known_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.well_known_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Search this path list instead of `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Run this program instead of `which` for the last-resort lookup.
    pub fn with_which_program(mut self, program: impl Into<PathBuf>, limit: Duration) -> Self {
        self.which_program = Some(program.into());
        self.which_timeout = limit;
        self
    }

    /// Skip the `which` subprocess fallback.
    pub fn without_which_command(mut self) -> Self {
        self.which_program = None;
        self
    }

    /// Resolve the configured overrides, discovering whatever is not set.
    ///
    /// An override that is not an executable file is ignored with a warning.
    pub async fn resolve(&self, config: &SpeechConfig) -> Option<TtsBackend> {
        let engine = match configured(config.backend.as_deref(), "TTS backend") {
            Some(path) => path,
            None => self.locate(&self.candidates, "TTS backend").await?,
        };

        let backend = TtsBackend::new(engine);
        if !backend.kind().is_espeak() {
            return Some(backend);
        }

        let player = match configured(config.player.as_deref(), "audio player") {
            Some(path) => Some(path),
            None => self.locate(&self.players, "audio player").await,
        };
        let backend = match player {
            Some(path) => backend.with_player(AudioPlayer::new(path)),
            None => backend,
        };
        debug!(backend = %backend, strategy = %backend.strategy(), "speech output resolved");
        Some(backend)
    }

    /// Search every source in order, ignoring any configured override.
    pub async fn discover(&self) -> Option<TtsBackend> {
        self.resolve(&SpeechConfig::default()).await
    }

    /// Human-readable list of what was searched, for error guidance.
    pub fn searched(&self) -> String {
        let dirs: Vec<String> = self
            .well_known_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        format!("{} in PATH and {}", self.candidates.join(", "), dirs.join(", "))
    }

    async fn locate(&self, names: &[String], what: &str) -> Option<PathBuf> {
        let found = match self
            .search_path_lookup(names)
            .or_else(|| self.well_known_lookup(names))
        {
            Some(path) => Some(path),
            None => self.which_command_lookup(names).await,
        };

        match &found {
            Some(path) => info!(path = %path.display(), "{what} found"),
            None => debug!(candidates = ?names, "no {what} found"),
        }
        found
    }

    fn search_path_lookup(&self, names: &[String]) -> Option<PathBuf> {
        names.iter().find_map(|name| {
            let result = match &self.search_path {
                Some(paths) => {
                    let cwd = std::env::current_dir().unwrap_or_default();
                    which::which_in(name, Some(paths), cwd)
                }
                None => which::which(name),
            };
            result
                .inspect_err(|e| debug!(candidate = %name, error = %e, "not in search path"))
                .ok()
        })
    }

    fn well_known_lookup(&self, names: &[String]) -> Option<PathBuf> {
        names.iter().find_map(|name| {
            self.well_known_dirs
                .iter()
                .map(|dir| dir.join(name))
                .find(|path| is_executable(path))
        })
    }

    async fn which_command_lookup(&self, names: &[String]) -> Option<PathBuf> {
        let program = self.which_program.as_ref()?;

        for name in names {
            let mut lookup = Command::new(program);
            lookup.arg(name).stdin(Stdio::null()).kill_on_drop(true);

            let output = match timeout(self.which_timeout, lookup.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    debug!(program = %program.display(), error = %e, "which lookup unavailable");
                    return None;
                }
                Err(_) => {
                    warn!(
                        candidate = %name,
                        timeout_ms = self.which_timeout.as_millis() as u64,
                        "which lookup timed out"
                    );
                    continue;
                }
            };

            if !output.status.success() {
                continue;
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            let path = PathBuf::from(stdout.trim());
            if is_executable(&path) {
                return Some(path);
            }
        }
        None
    }
}

/// A configured override, if it names an executable file.
fn configured(path: Option<&Path>, what: &str) -> Option<PathBuf> {
    let path = path?;
    if is_executable(path) {
        info!(path = %path.display(), "using configured {what}");
        return Some(path.to_path_buf());
    }
    warn!(
        path = %path.display(),
        "configured {what} is not an executable file, falling back to discovery"
    );
    None
}

/// Whether `path` is a regular file the current user may execute.
fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(BackendKind::from_path(Path::new("/usr/bin/espeak-ng")), BackendKind::EspeakNg);
        assert_eq!(BackendKind::from_path(Path::new("/usr/bin/espeak")), BackendKind::Espeak);
        assert_eq!(BackendKind::from_path(Path::new("spd-say")), BackendKind::SpdSay);
        assert_eq!(BackendKind::from_path(Path::new("/usr/bin/say")), BackendKind::Say);
        assert_eq!(BackendKind::from_path(Path::new("/opt/tts/festival")), BackendKind::Generic);
    }

    #[test]
    fn test_argument_templates() {
        assert_eq!(
            BackendKind::EspeakNg.args("hello"),
            ["-v", "en", "-s", "160", "-p", "50", "-a", "180", "hello"]
        );
        assert_eq!(BackendKind::Espeak.args("hi"), BackendKind::EspeakNg.args("hi"));
        assert_eq!(BackendKind::Say.args("hello"), ["-v", "Samantha", "-r", "180", "hello"]);
        assert_eq!(BackendKind::SpdSay.args("hello"), ["-w", "-r", "10", "hello"]);
        assert_eq!(BackendKind::Generic.args("hello"), ["hello"]);
    }

    #[test]
    fn test_strategy_selection() {
        let espeak = TtsBackend::new("/usr/bin/espeak-ng");
        assert_eq!(espeak.strategy(), SpeakStrategy::Direct);
        assert_eq!(
            espeak.clone().with_player(AudioPlayer::new("/usr/bin/aplay")).strategy(),
            SpeakStrategy::Pipeline
        );
        assert_eq!(
            espeak.with_player(AudioPlayer::new("/usr/bin/mpv")).strategy(),
            SpeakStrategy::WavFile
        );

        let say = TtsBackend::new("/usr/bin/say").with_player(AudioPlayer::new("/usr/bin/aplay"));
        assert_eq!(say.strategy(), SpeakStrategy::Direct);
    }

    #[test]
    fn test_pipeline_plan() {
        let backend = TtsBackend::new("/usr/bin/espeak").with_player(AudioPlayer::new("/usr/bin/play"));
        let SpeechPlan::Pipeline { engine, player } = backend.plan("hello", Path::new("/tmp/x.wav")) else {
            panic!("expected a pipeline");
        };
        assert_eq!(args_of(&engine)[0], "--stdout");
        assert_eq!(args_of(&engine).last().map(String::as_str), Some("hello"));
        assert_eq!(args_of(&player), ["-q", "-t", "wav", "-"]);
        assert_eq!(backend.to_string(), "/usr/bin/espeak (espeak) | /usr/bin/play (sox)");
    }

    #[test]
    fn test_wav_file_plan() {
        let backend = TtsBackend::new("/usr/bin/espeak-ng").with_player(AudioPlayer::new("/usr/bin/mpv"));
        let SpeechPlan::WavFile { engine, player, wav } = backend.plan("hello", Path::new("/tmp/x.wav")) else {
            panic!("expected a wav file plan");
        };
        let engine_args = args_of(&engine);
        assert!(engine_args.windows(2).any(|w| w == ["-w", "/tmp/x.wav"]));
        assert_eq!(args_of(&player), ["/tmp/x.wav"]);
        assert_eq!(wav, Path::new("/tmp/x.wav"));
    }

    #[test]
    fn test_player_args() {
        assert_eq!(PlayerKind::Aplay.stdin_args(), ["-q"]);
        assert!(PlayerKind::Paplay.stdin_args().is_empty());
        assert!(!PlayerKind::Other.reads_stdin());
        assert_eq!(
            PlayerKind::Aplay.file_args(Path::new("/tmp/a.wav")),
            [OsString::from("-q"), OsString::from("/tmp/a.wav")]
        );
    }

    #[test]
    fn test_searched_lists_candidates() {
        let discovery = BackendDiscovery::new()
            .with_candidates(["espeak"])
            .with_well_known_dirs(["/opt/tts"]);
        assert_eq!(discovery.searched(), "espeak in PATH and /opt/tts");
    }

    #[test]
    fn test_missing_path_is_not_executable() {
        assert!(!is_executable(Path::new("/nonexistent/voxwatch/espeak")));
    }
}
