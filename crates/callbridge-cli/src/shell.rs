//! Interactive command loop
//!
//! User-facing failures are printed and the loop continues. Fatal failures
//! stop the loop and are returned to `main`, which exits non-zero.

use std::io::Write;

use anyhow::{Context, Result};
use callbridge_core::{BridgeError, BridgeOrchestrator};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::commands::{Command, MENU};

const PROMPT: &str = " >> ";
const REPLY: &str = " << ";
const INVALID_INPUT: &str = "Invalid input. Please try again.";
const FAREWELL: &str = "Goodbye. Thanks for all the fish!";

pub struct Shell<'a, W> {
    orchestrator: &'a BridgeOrchestrator,
    out: W,
}

impl<'a, W: Write> Shell<'a, W> {
    pub fn new(orchestrator: &'a BridgeOrchestrator, out: W) -> Self {
        Self { orchestrator, out }
    }

    /// Run until `exit`, end of input, or a fatal error.
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        writeln!(self.out, "\nWelcome to callbridge!")?;
        writeln!(self.out, "{}", MENU)?;

        let mut lines = input.lines();
        loop {
            write!(self.out, "\n{}", PROMPT)?;
            self.out.flush()?;

            let Some(line) = lines.next_line().await.context("Failed to read input")? else {
                tracing::info!("End of input");
                self.reply(FAREWELL)?;
                break;
            };

            match line.parse::<Command>() {
                Ok(Command::Exit) => {
                    self.reply(FAREWELL)?;
                    break;
                }
                Ok(command) => self.execute(command).await?,
                Err(e) => {
                    tracing::debug!("Rejected input {:?}: {}", line, e);
                    self.invalid_input()?;
                }
            }
        }

        self.orchestrator
            .shutdown()
            .await
            .context("Failed to close the gateway connection")
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        let outcome = match command {
            Command::Dial { extensions } => self.orchestrator.dial(&extensions).await.map(|bridge| {
                tracing::info!("Started bridge {}", bridge);
            }),
            Command::Join {
                call_id,
                extensions,
            } => self
                .orchestrator
                .join(&call_id, &extensions)
                .await
                .map(|legs| tracing::info!("Dialed {} legs into {}", legs.len(), call_id)),
            Command::List => match self.orchestrator.list().await {
                Ok(calls) if calls.is_empty() => Err(BridgeError::NoOngoingCalls),
                Ok(calls) => {
                    for call in calls {
                        self.reply(&call.to_string())?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Exit => Ok(()),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(BridgeError::InvalidInput { message }) => {
                tracing::debug!("Rejected command: {}", message);
                self.invalid_input()
            }
            Err(e) if e.is_user_facing() => self.reply(&e.to_string()),
            Err(e) => {
                tracing::error!("Fatal: {}", e);
                Err(e.into())
            }
        }
    }

    fn reply(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "{}{}", REPLY, message)?;
        Ok(())
    }

    fn invalid_input(&mut self) -> Result<()> {
        self.reply(INVALID_INPUT)?;
        writeln!(self.out, "\n{}", MENU)?;
        Ok(())
    }
}
