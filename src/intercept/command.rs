//! Capabilities backed by an external program.
//!
//! Each call runs `program [args..] <identity>` with the statement text on
//! stdin. The child is killed if the call is dropped before it exits, so a
//! timed-out decision leaves nothing running behind it.

use std::{io, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};

use crate::config::intercept::CommandSpec;

use super::capability::{CapabilityError, RouteVerdict};

// -----------------------------------------------------------------------------
// ----- CommandCapability -----------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommandCapability {
    spec: CommandSpec,
}

// -----------------------------------------------------------------------------
// ----- CommandCapability: Static ---------------------------------------------

impl CommandCapability {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

// -----------------------------------------------------------------------------
// ----- CommandCapability: Public ---------------------------------------------

impl CommandCapability {
    /// Trimmed stdout names the dbkey; empty output means no change.
    pub async fn route(&self, identity: &str, query: &str) -> Result<RouteVerdict, CapabilityError> {
        let stdout = self.run(identity, query).await?;
        let dbkey = stdout.trim();

        Ok(if dbkey.is_empty() {
            RouteVerdict::NoChange
        } else {
            RouteVerdict::Route(dbkey.to_string())
        })
    }

    /// Stdout minus one trailing newline is the new text; empty output keeps
    /// the original.
    pub async fn rewrite(&self, identity: &str, query: &str) -> Result<String, CapabilityError> {
        let stdout = self.run(identity, query).await?;
        let text = stdout
            .strip_suffix("\r\n")
            .or_else(|| stdout.strip_suffix('\n'))
            .unwrap_or(&stdout);

        Ok(if text.is_empty() {
            query.to_string()
        } else {
            text.to_string()
        })
    }
}

// -----------------------------------------------------------------------------
// ----- CommandCapability: Private --------------------------------------------

impl CommandCapability {
    fn program(&self) -> String {
        self.spec.program.display().to_string()
    }

    async fn run(&self, identity: &str, query: &str) -> Result<String, CapabilityError> {
        let spawn_err = |source: io::Error| CapabilityError::Spawn {
            program: self.program(),
            source,
        };

        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg(identity)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                // Dropping the handle closes the pipe.
                Some(mut stdin) => stdin.write_all(query.as_bytes()).await,
                None => Ok(()),
            }
        };

        // Written concurrently so a chatty child cannot stall on a full
        // stdout pipe.
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(spawn_err)?;
        match written {
            // The child may exit without reading everything.
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(spawn_err(e)),
            _ => {}
        }

        if !output.status.success() {
            return Err(CapabilityError::Exit {
                program: self.program(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| CapabilityError::NonUtf8 {
            program: self.program(),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
