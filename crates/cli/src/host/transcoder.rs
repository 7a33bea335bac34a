//! External-command transcoder

use engine::{AbortFlag, ConvertSettings, TranscodeError, Track, Transcoder};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a configured command line for every conversion
///
/// `{input}`, `{output}` and `{preset}` are substituted in each argument.
/// The bit depth and float settings are passed through the environment as
/// `OWS_BITS_PER_SAMPLE` and `OWS_FLOAT_OUTPUT` when set.
#[derive(Debug, Clone)]
pub struct CommandTranscoder {
    program: String,
    args: Vec<String>,
}

impl CommandTranscoder {
    /// Build from a full command line, program first. `None` if empty.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn command(&self, settings: &ConvertSettings, input: &Path, output: &Path) -> Command {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| {
            arg.replace("{input}", &input)
                .replace("{output}", &output)
                .replace("{preset}", &settings.preset)
        }))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

        if let Some(bits) = settings.bits_per_sample {
            cmd.env("OWS_BITS_PER_SAMPLE", bits.to_string());
        }
        if let Some(float) = settings.float_output {
            cmd.env("OWS_FLOAT_OUTPUT", if float { "1" } else { "0" });
        }
        cmd
    }
}

impl Transcoder for CommandTranscoder {
    fn transcode(
        &self,
        settings: &ConvertSettings,
        track: &Track,
        output: &Path,
        abort: &AbortFlag,
    ) -> Result<(), TranscodeError> {
        let mut child = self.command(settings, &track.path, output).spawn()?;
        debug!(pid = child.id(), program = %self.program, "Started transcoder");

        // Drain stderr concurrently; the child stalls once the pipe fills
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });
        let collect_stderr = move || {
            stderr
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default()
        };

        let status = loop {
            if abort.is_raised() {
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill transcoder");
                }
                let _ = child.wait();
                remove_partial(output);
                return Err(TranscodeError::Aborted);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        if status.success() {
            let _ = collect_stderr();
            return Ok(());
        }

        let stderr = collect_stderr();
        remove_partial(output);

        let message = match stderr.trim() {
            "" => format!("{} exited with {}", self.program, status),
            detail => format!("{} exited with {}: {}", self.program, status, detail),
        };
        Err(TranscodeError::Failed(message))
    }
}

fn remove_partial(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "Failed to remove partial output"),
    }
}
