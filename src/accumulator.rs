use futures::StreamExt;
use log::{ debug, warn };
use std::time::Duration;

use crate::agent::AgentError;
use crate::llm::chat::FragmentStream;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(11);

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    fragments: usize,
}

impl StreamAccumulator {
    /// Appends a fragment and returns the text accumulated so far.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        self.fragments += 1;
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Drains `stream` into one string unless `timeout` elapses first.
///
/// `on_fragment` sees each fragment together with the text accumulated so
/// far. On timeout the stream is dropped, which cancels the producer.
pub async fn accumulate_with_timeout<F>(
    stream: FragmentStream,
    timeout: Duration,
    mut on_fragment: F
) -> Result<String, AgentError>
    where F: FnMut(&str, &str) + Send
{
    let mut acc = StreamAccumulator::default();

    let outcome = {
        let consume = async {
            let mut stream = stream;
            while let Some(item) = stream.next().await {
                let fragment = item.map_err(AgentError::Stream)?;
                let total = acc.push(&fragment);
                on_fragment(&fragment, total);
            }
            Ok::<(), AgentError>(())
        };
        tokio::time::timeout(timeout, consume).await
    };

    match outcome {
        Ok(Ok(())) => {
            debug!("Stream completed with {} fragments", acc.fragments());
            Ok(acc.into_text())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(
                "Response stream timed out after {:?} ({} chars received), abandoning it",
                timeout,
                acc.text().len()
            );
            Err(AgentError::Timeout(timeout))
        }
    }
}
