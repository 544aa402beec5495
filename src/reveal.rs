//! Word-by-word reveal of a streamed generation.
//!
//! The pipeline pulls decoded text chunks from any finite stream, splits them
//! into newline-delimited fragments and reveals each fragment's words one at a
//! time with a fixed delay, so the perceived typing speed does not depend on
//! how the network happened to chunk the response.
//!
//! ```text
//! Idle -> Requesting -> Streaming -> Draining -> Idle
//!              \______________\______ error ____/
//! ```

use std::{fmt, pin::pin, time::Duration};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::fragment::{Fragment, LineSplitter};

pub const ERROR_MARKER: &str = "\n\n[Error generating article]";
pub const WORDS_PER_MINUTE: usize = 200;
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(18);

/// The accumulated article text for one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    text: String,
}

impl Article {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Appends one word, space-separated from whatever precedes it.
    pub fn push_word(&mut self, word: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(word);
    }

    pub fn push_error_marker(&mut self) {
        self.text.push_str(ERROR_MARKER);
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Estimated read time in whole minutes, rounded up.
    pub fn read_time_minutes(&self) -> usize {
        self.word_count().div_ceil(WORDS_PER_MINUTE)
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Idle,
    Requesting,
    Streaming,
    Draining,
}

/// Where revealed text ends up.
pub trait Viewport {
    fn set_loading(&mut self, loading: bool);

    fn render(&mut self, article: &Article);

    fn scroll_to_bottom(&mut self) {}

    fn state_changed(&mut self, _state: RevealState) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStatus {
    /// The stream ended or the backend flagged the final fragment.
    Completed,
    /// A read failed; the article ends with [`ERROR_MARKER`].
    Failed,
    /// Superseded or cancelled by the caller before completion.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RevealOutcome {
    pub status: RevealStatus,
    pub article: Article,
}

enum Flow {
    Continue,
    Done,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RevealPipeline {
    word_delay: Duration,
}

impl Default for RevealPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_DELAY)
    }
}

impl RevealPipeline {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }

    /// Runs one generation to completion, failure or cancellation.
    ///
    /// `chunks` is consumed once and dropped on return, which releases the
    /// underlying connection when the run is cancelled early.
    pub async fn run<S, E, V>(
        &self,
        chunks: S,
        viewport: &mut V,
        cancel: &CancellationToken,
    ) -> RevealOutcome
    where
        S: Stream<Item = Result<String, E>>,
        E: fmt::Display,
        V: Viewport + ?Sized,
    {
        let mut run = Run {
            article: Article::new(),
            state: RevealState::Idle,
            word_delay: self.word_delay,
            viewport,
            cancel,
        };
        let mut chunks = pin!(chunks);
        let mut lines = LineSplitter::new();

        run.transition(RevealState::Requesting);
        run.viewport.set_loading(true);
        run.viewport.render(&run.article);

        let status = 'read: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'read RevealStatus::Cancelled,
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(text)) => {
                    if run.state == RevealState::Requesting {
                        run.transition(RevealState::Streaming);
                    }
                    for line in lines.push(&text) {
                        match run.reveal_line(&line).await {
                            Flow::Continue => {}
                            Flow::Done => {
                                run.transition(RevealState::Draining);
                                break 'read RevealStatus::Completed;
                            }
                            Flow::Cancelled => break 'read RevealStatus::Cancelled,
                        }
                    }
                }
                Some(Err(err)) => {
                    error!(%err, "generation stream failed");
                    if let Some(line) = lines.finish() {
                        if let Flow::Cancelled = run.reveal_line(&line).await {
                            break 'read RevealStatus::Cancelled;
                        }
                    }
                    run.article.push_error_marker();
                    run.viewport.render(&run.article);
                    break 'read RevealStatus::Failed;
                }
                None => {
                    run.transition(RevealState::Draining);
                    if let Some(line) = lines.finish() {
                        if let Flow::Cancelled = run.reveal_line(&line).await {
                            break 'read RevealStatus::Cancelled;
                        }
                    }
                    break 'read RevealStatus::Completed;
                }
            }
        };

        run.transition(RevealState::Idle);
        run.viewport.set_loading(false);
        debug!(?status, words = run.article.word_count(), "reveal finished");

        RevealOutcome {
            status,
            article: run.article,
        }
    }
}

struct Run<'a, V: ?Sized> {
    article: Article,
    state: RevealState,
    word_delay: Duration,
    viewport: &'a mut V,
    cancel: &'a CancellationToken,
}

impl<V: Viewport + ?Sized> Run<'_, V> {
    fn transition(&mut self, state: RevealState) {
        self.state = state;
        self.viewport.state_changed(state);
    }

    async fn reveal_line(&mut self, line: &str) -> Flow {
        let fragment = match Fragment::parse(line) {
            Ok(fragment) => fragment,
            Err(err) => {
                warn!(%err, line, "skipping malformed fragment");
                return Flow::Continue;
            }
        };

        for word in fragment.words() {
            if self.cancel.is_cancelled() {
                return Flow::Cancelled;
            }
            self.article.push_word(word);
            self.viewport.render(&self.article);
            self.viewport.scroll_to_bottom();
            if !self.pause().await {
                return Flow::Cancelled;
            }
        }

        if fragment.done { Flow::Done } else { Flow::Continue }
    }

    /// Waits out the per-word delay. Returns false when cancelled meanwhile.
    async fn pause(&self) -> bool {
        if self.word_delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.word_delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        loading: Vec<bool>,
        states: Vec<RevealState>,
        frames: Vec<String>,
        scrolls: usize,
        cancel_after_frames: Option<(usize, CancellationToken)>,
    }

    impl Viewport for Recorder {
        fn set_loading(&mut self, loading: bool) {
            self.loading.push(loading);
        }

        fn render(&mut self, article: &Article) {
            self.frames.push(article.as_str().to_string());
            if let Some((limit, token)) = &self.cancel_after_frames {
                if self.frames.len() > *limit {
                    token.cancel();
                }
            }
        }

        fn scroll_to_bottom(&mut self) {
            self.scrolls += 1;
        }

        fn state_changed(&mut self, state: RevealState) {
            self.states.push(state);
        }
    }

    fn chunks(items: &[&str]) -> impl Stream<Item = Result<String, String>> {
        stream::iter(
            items
                .iter()
                .map(|s| Ok(s.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    async fn reveal(items: &[&str]) -> (RevealOutcome, Recorder) {
        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(chunks(items), &mut viewport, &CancellationToken::new())
            .await;
        (outcome, viewport)
    }

    #[tokio::test]
    async fn gravity_scenario() {
        let (outcome, viewport) = reveal(&[
            "{\"response\":\"Gravity \"}\n",
            "{\"response\":\"pulls objects.\"}\n",
        ])
        .await;

        assert_eq!(outcome.status, RevealStatus::Completed);
        assert_eq!(outcome.article.as_str(), "Gravity pulls objects.");
        assert_eq!(viewport.loading, vec![true, false]);
        assert_eq!(
            viewport.states,
            vec![
                RevealState::Requesting,
                RevealState::Streaming,
                RevealState::Draining,
                RevealState::Idle,
            ]
        );
        // Cleared frame, then one frame per word.
        assert_eq!(
            viewport.frames,
            vec!["", "Gravity", "Gravity pulls", "Gravity pulls objects."]
        );
        assert_eq!(viewport.scrolls, 3);
    }

    #[tokio::test]
    async fn empty_stream_is_not_an_error() {
        let (outcome, viewport) = reveal(&[]).await;
        assert_eq!(outcome.status, RevealStatus::Completed);
        assert!(outcome.article.is_empty());
        assert_eq!(viewport.loading, vec![true, false]);
    }

    #[tokio::test]
    async fn failure_before_first_byte_appends_marker() {
        let failing = stream::iter(vec![Err::<String, _>("connection refused")]);
        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(failing, &mut viewport, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, RevealStatus::Failed);
        assert_eq!(outcome.article.as_str(), ERROR_MARKER);
        assert_eq!(viewport.loading, vec![true, false]);
        assert_eq!(viewport.states.last(), Some(&RevealState::Idle));
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_prior_words() {
        let items = vec![
            Ok("{\"response\":\"Half an\"}\n".to_string()),
            Err("reset by peer".to_string()),
        ];
        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(stream::iter(items), &mut viewport, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, RevealStatus::Failed);
        assert_eq!(
            outcome.article.as_str(),
            format!("Half an{ERROR_MARKER}")
        );
    }

    #[tokio::test]
    async fn failure_reveals_unterminated_record_first() {
        let items = vec![
            Ok("{\"response\":\"first\"}\n{\"response\":\"second\"}".to_string()),
            Err("connection reset".to_string()),
        ];
        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(stream::iter(items), &mut viewport, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, RevealStatus::Failed);
        assert_eq!(
            outcome.article.as_str(),
            format!("first second{ERROR_MARKER}")
        );
        assert_eq!(viewport.loading, vec![true, false]);
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let (outcome, _) = reveal(&["not-json\n{\"response\":\"ok\"}\n"]).await;
        assert_eq!(outcome.status, RevealStatus::Completed);
        assert_eq!(outcome.article.as_str(), "ok");
    }

    #[tokio::test]
    async fn inserting_a_malformed_line_changes_nothing() {
        let clean = [
            "{\"response\":\"The sky\"}\n{\"response\":\" is\"}\n",
            "{\"response\":\" blue.\"}\n",
        ];
        let noisy = [
            "{\"response\":\"The sky\"}\n{oops\n{\"response\":\" is\"}\n",
            "{\"response\":\" blue.\"}\n",
        ];
        let (clean, _) = reveal(&clean).await;
        let (noisy, _) = reveal(&noisy).await;
        assert_eq!(clean.article, noisy.article);
        assert_eq!(clean.article.as_str(), "The sky is blue.");
    }

    #[tokio::test]
    async fn bursty_and_trickled_delivery_agree() {
        let burst = ["{\"response\":\"one two\"}\n{\"response\":\" three\"}\n{\"response\":\"four\"}\n"];
        let trickle = [
            "{\"respo",
            "nse\":\"one two\"}",
            "\n{\"response\":\" three\"}\n",
            "{\"response\":\"four\"}",
        ];
        let (burst, _) = reveal(&burst).await;
        let (trickle, _) = reveal(&trickle).await;
        assert_eq!(burst.article.as_str(), "one two three four");
        assert_eq!(trickle.article, burst.article);
    }

    #[tokio::test]
    async fn word_count_covers_all_deltas() {
        let (outcome, _) = reveal(&[
            "{\"response\":\"  alpha\\tbeta \"}\n",
            "{\"response\":\"\"}\n",
            "{\"response\":\"gamma\\ndelta epsilon\"}\n",
        ])
        .await;
        assert_eq!(outcome.article.as_str(), "alpha beta gamma delta epsilon");
        assert_eq!(outcome.article.word_count(), 5);
        assert_eq!(outcome.article.read_time_minutes(), 1);
    }

    #[tokio::test]
    async fn done_flag_stops_reading() {
        let (outcome, viewport) = reveal(&[
            "{\"response\":\"final\",\"done\":false}\n",
            "{\"response\":\" word\",\"done\":true}\n{\"response\":\"ignored\"}\n",
            "{\"response\":\"also ignored\"}\n",
        ])
        .await;
        assert_eq!(outcome.status, RevealStatus::Completed);
        assert_eq!(outcome.article.as_str(), "final word");
        assert_eq!(viewport.loading, vec![true, false]);
    }

    #[tokio::test]
    async fn cancellation_stops_between_words() {
        let token = CancellationToken::new();
        let mut viewport = Recorder {
            // The cleared frame plus two words.
            cancel_after_frames: Some((2, token.clone())),
            ..Recorder::default()
        };
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(
                chunks(&["{\"response\":\"one two three four\"}\n"]),
                &mut viewport,
                &token,
            )
            .await;

        assert_eq!(outcome.status, RevealStatus::Cancelled);
        assert_eq!(outcome.article.as_str(), "one two");
        assert_eq!(viewport.loading, vec![true, false]);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stalled_read() {
        let token = CancellationToken::new();
        let stalled = chunks(&["{\"response\":\"hello\"}\n"]).chain(stream::pending());
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };

        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::new(Duration::ZERO)
            .run(stalled, &mut viewport, &token)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.status, RevealStatus::Cancelled);
        assert_eq!(outcome.article.as_str(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn words_are_paced_by_the_delay() {
        let started = tokio::time::Instant::now();
        let mut viewport = Recorder::default();
        let outcome = RevealPipeline::default()
            .run(
                chunks(&["{\"response\":\"a b c\"}\n"]),
                &mut viewport,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.article.as_str(), "a b c");
        assert!(started.elapsed() >= DEFAULT_WORD_DELAY * 3);
    }

    #[test]
    fn read_time_rounds_up() {
        let mut article = Article::new();
        assert_eq!(article.read_time_minutes(), 0);
        article.push_word("one");
        assert_eq!(article.read_time_minutes(), 1);
        for _ in 0..200 {
            article.push_word("w");
        }
        assert_eq!(article.word_count(), 201);
        assert_eq!(article.read_time_minutes(), 2);
    }
}
