//! Sources of raw walker output.
//!
//! The parser only needs "a lazy, finite sequence of byte lines". The live
//! source is the PowerShell walker's stdout; a captured copy of that output
//! can be replayed from disk instead.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Split},
    path::Path,
    process::{Child, ChildStdout, Command, Stdio},
};
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;

/// A running walker process whose stdout is read line by line.
///
/// End of stream reaps the child. Dropping it early kills the child, so the
/// process never outlives the run on an error path.
pub struct WalkerProcess {
    program: String,
    child: Option<Child>,
    lines: Split<BufReader<ChildStdout>>,
}

impl WalkerProcess {
    #[instrument(level = "info", skip_all, fields(program = %program, script = %script.display()))]
    pub fn spawn(program: &str, script: &Path) -> Result<Self, PipelineError> {
        info!("starting walker; it enumerates every file with its size, age and owner");
        let invocation = |source: io::Error| PipelineError::Invocation {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(invocation)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            invocation(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "walker stdout was not captured",
            ))
        })?;
        debug!(pid = child.id(), "walker started");

        Ok(Self {
            program: program.to_string(),
            child: Some(child),
            lines: BufReader::new(stdout).split(b'\n'),
        })
    }

    fn reap(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.wait() {
            Ok(status) if status.success() => info!(program = %self.program, "walker finished"),
            Ok(status) => warn!(
                program = %self.program,
                %status,
                "walker exited unsuccessfully; its output may be incomplete"
            ),
            Err(e) => warn!(program = %self.program, "failed to wait for walker: {}", e),
        }
    }
}

impl Iterator for WalkerProcess {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.lines.next();
        if next.is_none() {
            self.reap();
        }
        next
    }
}

impl Drop for WalkerProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(program = %self.program, "walker output abandoned; stopping process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Lines of a previously captured walker output file.
pub type ReplayLines = Split<BufReader<File>>;

/// Open a captured walker output file. Anything but a regular file is refused.
pub fn replay_lines(path: &Path) -> Result<ReplayLines, PipelineError> {
    info!(path = %path.display(), "replaying captured walker output");
    let invocation = |source: io::Error| PipelineError::Invocation {
        program: path.display().to_string(),
        source,
    };

    let file = File::open(path).map_err(invocation)?;
    if !file.metadata().map_err(invocation)?.is_file() {
        return Err(invocation(io::Error::new(
            io::ErrorKind::InvalidInput,
            "replay source is not a regular file",
        )));
    }
    Ok(BufReader::new(file).split(b'\n'))
}

/// Either kind of walker output, so the pipeline can take one concrete type.
pub enum LineSource {
    Process(WalkerProcess),
    Replay(ReplayLines),
}

impl Iterator for LineSource {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LineSource::Process(p) => p.next(),
            LineSource::Replay(r) => r.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn replay_yields_raw_lines() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"Name: a.txt\r\nOwner: b\n\xa4\n")?;

        let lines: Vec<Vec<u8>> = replay_lines(tmp.path())?.collect::<io::Result<_>>()?;
        assert_eq!(
            lines,
            vec![b"Name: a.txt\r".to_vec(), b"Owner: b".to_vec(), vec![0xa4]]
        );
        Ok(())
    }

    #[test]
    fn missing_replay_file_is_an_invocation_error() {
        let err = replay_lines(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::Invocation { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_program_is_an_invocation_error() {
        let err = WalkerProcess::spawn("no-such-walker-binary-xyz", Path::new("script.ps1"))
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, PipelineError::Invocation { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn directory_is_not_a_replay_source() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = replay_lines(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Invocation { .. }));
        assert_eq!(err.exit_code(), 2);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn process_stdout_is_streamed_and_reaped() -> Result<()> {
        let mut script = NamedTempFile::new()?;
        writeln!(script, "printf 'LastWriteTime: 01/02/2024 10:00:00\\nOwner: x\\n'")?;

        let mut walker = WalkerProcess::spawn("sh", script.path())?;
        let lines: Vec<Vec<u8>> = walker.by_ref().collect::<io::Result<_>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], b"Owner: x".to_vec());
        assert!(walker.child.is_none());
        Ok(())
    }
}
