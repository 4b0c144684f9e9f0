//! Classification with contract enforcement
//!
//! [`Classifier::classify`] drives the retry loop:
//! sanitize → (invoke → validate)* → assemble. Content failures are fed back
//! to the model and retried with exponential backoff; when the attempt budget
//! runs out a degraded result is returned instead of an error. Only transport
//! failures and deadline expiry are errors.

use crate::assembler::{assemble, degraded, Assembled};
use crate::client::{CompletionClient, CompletionError, CompletionRequest, ResponseSchema};
use crate::prompts::{Conversation, PromptComposer, DEFAULT_TASK};
use crate::sleeper::{backoff_delay, Sleeper, TokioSleeper};
use crate::{Error, Result};
use newsroll_core::types::check_categories;
use newsroll_core::{
    sanitize, CategorySpec, ClassificationReport, ClassificationResult, ClassificationSettings,
    ClassifyMode, DecodingMode, DegradedPolicy, Group, Outcome, ResponseValidator,
    ValidationError, WorkItem,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Classifier options
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    /// Default attempt budget for requests built with [`Classifier::request`]
    pub max_attempts: u32,
    /// Default first backoff delay
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
    /// Offending ids quoted per validation error
    pub preview_limit: usize,
    pub degraded_policy: DegradedPolicy,
    /// Overall time limit for one classification call
    pub deadline: Option<Duration>,
    /// Decoding mode to start in
    pub decoding_mode: DecodingMode,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            preview_limit: newsroll_core::validation::DEFAULT_PREVIEW_LIMIT,
            degraded_policy: DegradedPolicy::Empty,
            deadline: None,
            decoding_mode: DecodingMode::Schema,
        }
    }
}

impl From<&ClassificationSettings> for ClassifierOptions {
    fn from(settings: &ClassificationSettings) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::try_from_secs_f64(settings.base_delay_seconds)
                .unwrap_or(defaults.base_delay),
            preview_limit: settings.preview_limit,
            degraded_policy: settings.degraded_policy.clone(),
            deadline: settings
                .deadline_seconds
                .and_then(|s| Duration::try_from_secs_f64(s).ok()),
            ..defaults
        }
    }
}

/// One classification call
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyRequest {
    pub items: Vec<WorkItem>,
    /// Closed category list; empty means the model invents labels
    pub categories: Vec<CategorySpec>,
    pub mode: ClassifyMode,
    /// Task rules sent as the system instructions
    pub instructions: String,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ClassifyRequest {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let defaults = ClassifierOptions::default();
        Self {
            items,
            categories: Vec::new(),
            mode: ClassifyMode::Partition,
            instructions: DEFAULT_TASK.to_string(),
            max_attempts: defaults.max_attempts,
            base_delay: defaults.base_delay,
        }
    }

    pub fn with_categories(mut self, categories: Vec<CategorySpec>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_mode(mut self, mode: ClassifyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

/// Which message history an attempt sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// Instructions and payload only
    Initial,
    /// History extended with feedback on the previous response
    Feedback,
    /// Same history as the previous, rate-limited attempt
    Verbatim,
}

/// Bookkeeping for one completion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based
    pub sequence: u32,
    /// Wait before this attempt
    pub backoff_delay: Duration,
    pub variant: PromptVariant,
}

/// LLM-backed classifier
///
/// Holds the completion client and the sticky decoding mode. It is `Sync`,
/// so one classifier can serve concurrent calls; once the provider rejects
/// schema-constrained decoding, every later call uses free-form JSON.
pub struct Classifier {
    client: Arc<dyn CompletionClient>,
    sleeper: Arc<dyn Sleeper>,
    options: ClassifierOptions,
    schema: ResponseSchema,
    freeform: AtomicBool,
}

impl Classifier {
    /// Create a classifier with default options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use newsroll_classifier::{Classifier, OpenAiClient};
    /// use newsroll_core::{Config, WorkItem};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = Config::load_default()?;
    ///     let client = OpenAiClient::from_config(&config)?;
    ///     let classifier = Classifier::new(Arc::new(client))?;
    ///
    ///     let request = classifier
    ///         .request(vec![WorkItem::new(17).with_field("title", "EU passes AI act")])
    ///         .with_categories(config.categories.clone());
    ///     let result = classifier.classify(&request).await?;
    ///     println!("{} groups", result.groups.len());
    ///     Ok(())
    /// }
    /// ```
    pub fn new(client: Arc<dyn CompletionClient>) -> Result<Self> {
        Self::with_options(client, ClassifierOptions::default())
    }

    /// Create a classifier with custom options
    pub fn with_options(client: Arc<dyn CompletionClient>, options: ClassifierOptions) -> Result<Self> {
        info!(
            "Initializing Classifier: max_attempts={}, decoding_mode={}",
            options.max_attempts, options.decoding_mode
        );
        Ok(Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            freeform: AtomicBool::new(options.decoding_mode == DecodingMode::Freeform),
            schema: ResponseSchema::classification()?,
            options,
        })
    }

    /// Replace the sleeper used for backoff waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    /// Decoding mode the next attempt will use
    pub fn decoding_mode(&self) -> DecodingMode {
        if self.freeform.load(Ordering::SeqCst) {
            DecodingMode::Freeform
        } else {
            DecodingMode::Schema
        }
    }

    /// Request pre-filled with this classifier's attempt budget and backoff
    pub fn request(&self, items: Vec<WorkItem>) -> ClassifyRequest {
        ClassifyRequest::new(items)
            .with_max_attempts(self.options.max_attempts)
            .with_base_delay(self.options.base_delay)
    }

    /// Classify a batch of work items
    ///
    /// Content-level failures never produce an error: after the attempt
    /// budget is spent the degraded result configured by
    /// [`ClassifierOptions::degraded_policy`] is returned.
    pub async fn classify(&self, request: &ClassifyRequest) -> Result<ClassificationResult> {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|limit| (started + limit, limit));

        self.check_request(request)?;
        let batch = sanitize(&request.items)?;

        info!(
            "Classifying {} items: mode={}, categories={}, max_attempts={}",
            batch.ids.len(),
            request.mode,
            request.categories.len(),
            request.max_attempts
        );

        if batch.ids.is_empty() {
            debug!("No items to classify");
            let groups = degraded(&DegradedPolicy::Empty, &batch.ids, &request.categories);
            return Ok(self.finish(groups, Vec::new(), Outcome::Success, 0, 0, Vec::new(), started));
        }

        let composer = PromptComposer::new(&request.instructions, &request.categories, request.mode);
        let mut conversation = composer.compose(&batch)?;
        let validator = ResponseValidator::new(&batch.ids, request.mode, &request.categories)
            .with_preview_limit(self.options.preview_limit);

        let mut attempts = 0;
        let mut rate_limited = 0;
        let mut last_errors: Vec<ValidationError> = Vec::new();
        let mut variant = PromptVariant::Initial;

        for sequence in 1..=request.max_attempts {
            let attempt = Attempt {
                sequence,
                backoff_delay: if sequence == 1 {
                    Duration::ZERO
                } else {
                    backoff_delay(request.base_delay, sequence - 1, self.options.max_delay)
                },
                variant,
            };

            if sequence > 1 {
                debug!(
                    "Waiting {:?} before attempt {}/{}",
                    attempt.backoff_delay, sequence, request.max_attempts
                );
                self.wait(attempt.backoff_delay, deadline).await?;
            }

            attempts = sequence;
            debug!(
                "Attempt {}/{}: variant={:?}, messages={}",
                sequence,
                request.max_attempts,
                attempt.variant,
                conversation.len()
            );

            let raw = match self.invoke(&conversation, deadline).await? {
                Ok(raw) => raw,
                Err(CompletionError::RateLimited(reason)) => {
                    rate_limited += 1;
                    warn!(
                        "Rate limited on attempt {}/{}: {}",
                        sequence, request.max_attempts, reason
                    );
                    variant = PromptVariant::Verbatim;
                    continue;
                }
                Err(CompletionError::Transport(reason)) => {
                    error!("Completion failed on attempt {}: {}", sequence, reason);
                    return Err(Error::Transport(reason));
                }
                Err(other) => {
                    error!("Completion failed on attempt {}: {}", sequence, other);
                    return Err(Error::Transport(other.to_string()));
                }
            };

            match validator.validate(&raw) {
                Ok(validated) => {
                    let Assembled { groups, warnings } =
                        assemble(validated, &batch.ids, &request.categories);
                    for warning in &warnings {
                        debug!("Classification warning: {}", warning);
                    }
                    info!(
                        "Classification succeeded on attempt {}: {} groups, {} warnings",
                        sequence,
                        groups.len(),
                        warnings.len()
                    );
                    return Ok(self.finish(
                        groups,
                        warnings,
                        Outcome::Success,
                        attempts,
                        rate_limited,
                        Vec::new(),
                        started,
                    ));
                }
                Err(errors) => {
                    warn!(
                        "Attempt {}/{} failed validation with {} error(s): {}",
                        sequence,
                        request.max_attempts,
                        errors.len(),
                        render(&errors).join(" | ")
                    );
                    if sequence < request.max_attempts {
                        conversation.push(composer.feedback(&errors, &batch.ids));
                    }
                    last_errors = errors;
                    variant = PromptVariant::Feedback;
                }
            }
        }

        let mut rendered = render(&last_errors);
        if rendered.is_empty() {
            rendered.push("the completion service rate limited every attempt".to_string());
        }
        warn!(
            "Attempt budget of {} exhausted, returning degraded result. Last errors: {}",
            request.max_attempts,
            rendered.join(" | ")
        );

        let groups = degraded(&self.options.degraded_policy, &batch.ids, &request.categories);
        Ok(self.finish(
            groups,
            Vec::new(),
            Outcome::Degraded,
            attempts,
            rate_limited,
            rendered,
            started,
        ))
    }

    fn check_request(&self, request: &ClassifyRequest) -> Result<()> {
        if request.max_attempts == 0 {
            return Err(Error::InvalidRequest(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        check_categories(&request.categories)?;
        Ok(())
    }

    /// One completion, switching to free-form JSON for good if the provider
    /// rejects the schema
    async fn invoke(
        &self,
        conversation: &Conversation,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<std::result::Result<String, CompletionError>> {
        let mode = self.decoding_mode();
        let schema = match mode {
            DecodingMode::Schema => Some(&self.schema),
            DecodingMode::Freeform => None,
        };

        match self.call(conversation.request(schema), deadline).await? {
            Err(CompletionError::SchemaRejected(reason)) if mode == DecodingMode::Schema => {
                self.fall_back_to_freeform(&reason);
                self.call(conversation.request(None), deadline).await
            }
            other => Ok(other),
        }
    }

    async fn call(
        &self,
        request: CompletionRequest,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<std::result::Result<String, CompletionError>> {
        let Some((at, limit)) = deadline else {
            return Ok(self.client.complete(&request).await);
        };

        let remaining = at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or(Error::DeadlineExceeded(limit))?;

        tokio::time::timeout(remaining, self.client.complete(&request))
            .await
            .map_err(|_| {
                warn!("Completion call hit the {:?} deadline", limit);
                Error::DeadlineExceeded(limit)
            })
    }

    async fn wait(&self, delay: Duration, deadline: Option<(Instant, Duration)>) -> Result<()> {
        if let Some((at, limit)) = deadline {
            if Instant::now() + delay >= at {
                warn!("Backoff of {:?} would pass the {:?} deadline", delay, limit);
                return Err(Error::DeadlineExceeded(limit));
            }
        }
        self.sleeper.sleep(delay).await;
        Ok(())
    }

    fn fall_back_to_freeform(&self, reason: &str) {
        if !self.freeform.swap(true, Ordering::SeqCst) {
            warn!(
                "Schema-constrained decoding rejected, falling back to JSON object mode: {}",
                reason
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        groups: Vec<Group>,
        warnings: Vec<String>,
        outcome: Outcome,
        attempts: u32,
        rate_limited: u32,
        last_errors: Vec<String>,
        started: Instant,
    ) -> ClassificationResult {
        ClassificationResult {
            groups,
            warnings,
            report: ClassificationReport {
                outcome,
                attempts,
                rate_limited,
                decoding_mode: self.decoding_mode(),
                last_errors,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    }
}

fn render(errors: &[ValidationError]) -> Vec<String> {
    errors.iter().map(|e| e.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedClient(&'static str);

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> std::result::Result<String, CompletionError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_options_from_settings() {
        let settings = ClassificationSettings {
            max_attempts: 3,
            base_delay_seconds: 0.5,
            deadline_seconds: Some(30.0),
            degraded_policy: DegradedPolicy::CatchAll {
                label: "other topics".into(),
            },
            ..Default::default()
        };

        let options = ClassifierOptions::from(&settings);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.base_delay, Duration::from_millis(500));
        assert_eq!(options.deadline, Some(Duration::from_secs(30)));
        assert_eq!(options.max_delay, Duration::from_secs(60));
        assert_eq!(options.decoding_mode, DecodingMode::Schema);
    }

    #[test]
    fn test_request_uses_classifier_defaults() {
        let options = ClassifierOptions {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let classifier = Classifier::with_options(Arc::new(FixedClient("{}")), options).unwrap();
        let request = classifier.request(vec![WorkItem::new(1)]);

        assert_eq!(request.max_attempts, 2);
        assert_eq!(request.base_delay, Duration::from_millis(10));
        assert_eq!(request.mode, ClassifyMode::Partition);
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let classifier = Classifier::new(Arc::new(FixedClient("not json"))).unwrap();
        let request = ClassifyRequest::new(Vec::new())
            .with_categories(vec![CategorySpec::new("AI policy", "")]);

        let result = classifier.classify(&request).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.report.attempts, 0);
        assert_eq!(result.groups.len(), 1);
        assert!(result.groups[0].is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let classifier = Classifier::new(Arc::new(FixedClient("{}"))).unwrap();

        let zero = ClassifyRequest::new(vec![WorkItem::new(1)]).with_max_attempts(0);
        assert!(matches!(
            classifier.classify(&zero).await,
            Err(Error::InvalidRequest(_))
        ));

        let duplicate = ClassifyRequest::new(vec![WorkItem::new(1), WorkItem::new(1)]);
        assert!(matches!(
            classifier.classify(&duplicate).await,
            Err(Error::Core(newsroll_core::Error::DuplicateItemId(1)))
        ));
    }
}
