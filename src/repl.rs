//! Line-oriented console loop: prompt, forward to the agent, print, repeat.

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

pub const PROMPT: &str = "Enter your Kubernetes request (or type 'Thanks!' to exit): ";
pub const SENTINEL: &str = "Thanks!";
pub const FAREWELL: &str = "Goodbye!";
pub const NO_RESPONSE: &str = "No response from the agent.";

/// Anything that turns a line of user input into an answer.
#[async_trait]
pub trait Responder: Send {
    async fn respond(&mut self, input: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    AwaitingInput,
    Terminated,
}

impl ReplState {
    /// State after reading `input`: exact, case-sensitive sentinel match
    /// once surrounding whitespace is trimmed.
    pub fn after(input: &str) -> Self {
        if input.trim() == SENTINEL {
            Self::Terminated
        } else {
            Self::AwaitingInput
        }
    }
}

/// Drive `responder` from `input` until the sentinel or end of input.
///
/// Agent errors are printed and the loop continues.
pub async fn run<R, W, A>(input: R, output: &mut W, responder: &mut A) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    A: Responder,
{
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            write_line(output, "").await?;
            write_line(output, FAREWELL).await?;
            return Ok(());
        };

        if ReplState::after(&line) == ReplState::Terminated {
            write_line(output, FAREWELL).await?;
            return Ok(());
        }

        match responder.respond(&line).await {
            Ok(Some(answer)) => write_line(output, &answer).await?,
            Ok(None) => write_line(output, NO_RESPONSE).await?,
            Err(e) => {
                warn!(error = %e, "request failed");
                write_line(output, &format!("Error: {e}")).await?;
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
