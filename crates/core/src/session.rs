//! Screen flow: prompt entry, candidate selection, finalize and download.
//!
//! [`SessionState`] is plain data and changes only through
//! [`SessionState::apply`]. [`Session`] is the controller that owns the
//! state together with the batch orchestrator and the generator, performs
//! the side effects and feeds the outcome back as events.
//!
//! ```text
//! PromptInput --Generated--> ImageSelection --Finalized--> FinalizeDownload
//!      ^                          |    ^                         |
//!      +-----------Back-----------+    +----------Back-----------+
//! ```

use crate::batch::{BatchOrchestrator, BatchReport};
use crate::catalog::{self, AspectRatioSpec};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::gemini::{GenerationRequest, ImageGenerator, MAX_IMAGES};
use crate::pipeline::{ProcessedGroup, SourceImage};
use log::{debug, error, info};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    PromptInput,
    ImageSelection,
    FinalizeDownload,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Screen::PromptInput => "prompt input",
            Screen::ImageSelection => "image selection",
            Screen::FinalizeDownload => "finalize",
        };
        f.write_str(name)
    }
}

/// Everything that happens to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A generation call is about to start with these parameters.
    GenerationStarted {
        prompt: String,
        aspect_ratio_key: String,
        size_keys: Vec<String>,
    },
    /// Candidates arrived.
    Generated(Vec<SourceImage>),
    GenerationFailed(String),
    /// The selection was processed into a batch.
    Finalized {
        selected_ids: Vec<String>,
        size_keys: Vec<String>,
    },
    ProcessingFailed(String),
    SizesChanged(Vec<String>),
    Back,
    StartOver,
    DismissError,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::GenerationStarted { .. } => "generate",
            SessionEvent::Generated(_) => "show candidates",
            SessionEvent::GenerationFailed(_) => "report a generation failure",
            SessionEvent::Finalized { .. } => "finalize",
            SessionEvent::ProcessingFailed(_) => "report a processing failure",
            SessionEvent::SizesChanged(_) => "change sizes",
            SessionEvent::Back => "go back",
            SessionEvent::StartOver => "start over",
            SessionEvent::DismissError => "dismiss the error",
        }
    }
}

/// Canonical parameters and screen of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub screen: Screen,
    pub prompt: String,
    pub aspect_ratio_key: String,
    pub size_keys: Vec<String>,
    pub generated: Vec<SourceImage>,
    pub selected_ids: Vec<String>,
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        let aspect_ratio = catalog::default_aspect_ratio();
        Self {
            screen: Screen::PromptInput,
            prompt: String::new(),
            aspect_ratio_key: aspect_ratio.key.to_string(),
            size_keys: aspect_ratio.all_size_keys(),
            generated: Vec::new(),
            selected_ids: Vec::new(),
            error: None,
        }
    }
}

impl SessionState {
    /// Computes the state after `event`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidTransition`] when the event makes no sense
    /// on the current screen.
    pub fn apply(self, event: SessionEvent) -> Result<Self> {
        use Screen::*;
        use SessionEvent::*;

        let screen = self.screen;
        let invalid = |event: &SessionEvent| AppError::transition(screen.to_string(), event.name());

        let next = match event {
            GenerationStarted {
                prompt,
                aspect_ratio_key,
                size_keys,
            } if matches!(screen, PromptInput | ImageSelection) => Self {
                prompt,
                aspect_ratio_key,
                size_keys,
                generated: Vec::new(),
                selected_ids: Vec::new(),
                error: None,
                ..self
            },
            Generated(images) if matches!(screen, PromptInput | ImageSelection) => Self {
                screen: ImageSelection,
                generated: images,
                selected_ids: Vec::new(),
                error: None,
                ..self
            },
            GenerationFailed(message) => Self {
                error: Some(message),
                ..self
            },
            Finalized {
                selected_ids,
                size_keys,
            } if screen == ImageSelection => Self {
                screen: FinalizeDownload,
                selected_ids,
                size_keys,
                error: None,
                ..self
            },
            ProcessingFailed(message) => Self {
                error: Some(message),
                ..self
            },
            SizesChanged(size_keys) if screen == FinalizeDownload => Self {
                size_keys,
                error: None,
                ..self
            },
            Back if screen == FinalizeDownload => Self {
                screen: ImageSelection,
                ..self
            },
            Back if screen == ImageSelection => Self::default(),
            StartOver => Self::default(),
            DismissError => Self {
                error: None,
                ..self
            },
            other => return Err(invalid(&other)),
        };
        Ok(next)
    }

    /// The selected aspect ratio, or the default when the key is unknown.
    pub fn aspect_ratio(&self) -> &'static AspectRatioSpec {
        catalog::aspect_ratio(&self.aspect_ratio_key).unwrap_or_else(catalog::default_aspect_ratio)
    }
}

/// Drives a session against an [`ImageGenerator`].
pub struct Session<G: ImageGenerator> {
    state: SessionState,
    batch: BatchOrchestrator,
    generator: G,
    api_key: Option<String>,
    model: String,
    count: u32,
}

impl<G: ImageGenerator> Session<G> {
    pub fn new(generator: G, config: &Config) -> Self {
        Self {
            state: SessionState::default(),
            batch: BatchOrchestrator::new(),
            generator,
            api_key: config.gemini_api_key.clone(),
            model: config.model_name.clone(),
            count: MAX_IMAGES,
        }
    }

    /// Sets how many candidates each generation asks for.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Replaces the credential and model, e.g. after the settings were saved.
    pub fn set_credentials(&mut self, api_key: Option<String>, model: impl Into<String>) {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self.model = model.into();
        self.state.error = None;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn groups(&self) -> &[ProcessedGroup] {
        self.batch.groups()
    }

    pub fn report(&self) -> &BatchReport {
        self.batch.report()
    }

    pub fn current_aspect_ratio(&self) -> &'static AspectRatioSpec {
        self.state.aspect_ratio()
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<()> {
        self.state = self.state.clone().apply(event)?;
        Ok(())
    }

    /// Records `err` as the visible session error and hands it back.
    fn fail(&mut self, err: AppError, event: fn(String) -> SessionEvent) -> AppError {
        error!("{}", err);
        if let Ok(next) = self.state.clone().apply(event(err.to_string())) {
            self.state = next;
        }
        err
    }

    /// Generates a fresh set of candidates and moves to the selection screen.
    ///
    /// Previous candidates, selection and processed groups are dropped
    /// before the call.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingCredential`] without calling the API when
    /// no key is configured; generation failures are returned as is.
    pub async fn generate<S: AsRef<str>>(
        &mut self,
        prompt: &str,
        aspect_ratio_key: &str,
        size_keys: &[S],
    ) -> Result<&[SourceImage]> {
        let Some(api_key) = self.api_key.clone() else {
            return Err(self.fail(AppError::MissingCredential, SessionEvent::GenerationFailed));
        };
        if prompt.trim().is_empty() {
            return Err(AppError::EmptyPrompt);
        }
        let aspect_ratio = catalog::aspect_ratio(aspect_ratio_key)
            .ok_or_else(|| AppError::UnknownAspectRatio(aspect_ratio_key.to_string()))?;

        self.dispatch(SessionEvent::GenerationStarted {
            prompt: prompt.to_string(),
            aspect_ratio_key: aspect_ratio.key.to_string(),
            size_keys: size_keys.iter().map(|k| k.as_ref().to_string()).collect(),
        })?;
        self.batch.reset();

        let request = GenerationRequest {
            prompt: format!("{}, digital art, {}", prompt, aspect_ratio.label),
            api_key,
            model: self.model.clone(),
            count: self.count,
        };
        info!("generating {} image(s) for {:?}", request.clamped_count(), prompt);

        let images = match self.generator.generate(&request).await {
            Ok(images) => images,
            Err(e) => return Err(self.fail(e, SessionEvent::GenerationFailed)),
        };

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let sources = images
            .into_iter()
            .enumerate()
            .map(|(index, pixels)| SourceImage::new(format!("gen-{}-{}", stamp, index), pixels))
            .collect();

        self.dispatch(SessionEvent::Generated(sources))?;
        Ok(&self.state.generated)
    }

    /// Generates again with the current prompt and parameters.
    pub async fn regenerate(&mut self) -> Result<&[SourceImage]> {
        let SessionState {
            prompt,
            aspect_ratio_key,
            size_keys,
            ..
        } = self.state.clone();
        if prompt.is_empty() {
            return Err(AppError::EmptyPrompt);
        }
        self.generate(&prompt, &aspect_ratio_key, size_keys.as_slice()).await
    }

    /// Appends a refinement to the current prompt and generates again.
    pub async fn refine(&mut self, refinement: &str) -> Result<&[SourceImage]> {
        let SessionState {
            prompt,
            aspect_ratio_key,
            size_keys,
            ..
        } = self.state.clone();
        if prompt.is_empty() {
            return Err(AppError::EmptyPrompt);
        }
        let refined = format!("{}. Refinement: {}", prompt, refinement.trim());
        self.generate(&refined, &aspect_ratio_key, size_keys.as_slice()).await
    }

    /// Processes the chosen candidates and moves to the finalize screen.
    ///
    /// Ids are matched against the current candidates; unknown ids and
    /// duplicates are ignored and the batch follows candidate order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EmptySelection`] when no id matches and
    /// [`AppError::BatchEmpty`] when every selected image failed; the
    /// session stays on the selection screen in both cases.
    pub async fn proceed_with_selection<S: AsRef<str>>(
        &mut self,
        ids: &[S],
    ) -> Result<&[ProcessedGroup]> {
        if self.state.screen != Screen::ImageSelection {
            return Err(AppError::transition(self.state.screen.to_string(), "finalize"));
        }

        let selected: Vec<SourceImage> = self
            .state
            .generated
            .iter()
            .filter(|img| ids.iter().any(|id| id.as_ref() == img.id))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(AppError::EmptySelection);
        }
        let selected_ids = selected.iter().map(|s| s.id.clone()).collect();

        let aspect_ratio = self.state.aspect_ratio();
        info!("processing {} {} image(s)", selected.len(), aspect_ratio.label);
        let size_keys = self.state.size_keys.clone();
        let outcome = self
            .batch
            .derive_all(selected, aspect_ratio, size_keys.as_slice())
            .await
            .map(|_| ());
        if let Err(e) = outcome {
            return Err(self.fail(e, SessionEvent::ProcessingFailed));
        }

        let effective: Vec<String> = self.batch.selected_size_keys().iter().cloned().collect();
        let size_keys = aspect_ratio
            .resolve_sizes(effective.as_slice())
            .iter()
            .map(|s| s.key.to_string())
            .collect();
        self.dispatch(SessionEvent::Finalized {
            selected_ids,
            size_keys,
        })?;
        Ok(self.batch.groups())
    }

    /// Re-derives the batch for a new size selection on the finalize screen.
    ///
    /// Keys the current aspect ratio does not offer are dropped; the state
    /// keeps the remaining ones in candidate order.
    pub async fn change_sizes<S: AsRef<str>>(
        &mut self,
        size_keys: &[S],
    ) -> Result<&[ProcessedGroup]> {
        let keys: Vec<String> = self
            .state
            .aspect_ratio()
            .resolve_sizes(size_keys)
            .iter()
            .map(|s| s.key.to_string())
            .collect();
        self.dispatch(SessionEvent::SizesChanged(keys.clone()))?;

        info!(
            "re-processing {} image(s) with new sizes",
            self.batch.selected_sources().len()
        );
        let outcome = self
            .batch
            .rederive_on_size_change(keys.as_slice())
            .await
            .map(|_| ());
        if let Err(e) = outcome {
            return Err(self.fail(e, SessionEvent::ProcessingFailed));
        }
        Ok(self.batch.groups())
    }

    /// Goes one screen back. Leaving the selection screen starts over.
    pub fn back(&mut self) -> Result<()> {
        let leaving_selection = self.state.screen == Screen::ImageSelection;
        self.dispatch(SessionEvent::Back)?;
        if leaving_selection {
            self.batch.reset();
        }
        Ok(())
    }

    /// Drops every candidate and result and returns to prompt entry.
    pub fn start_over(&mut self) {
        self.state = SessionState::default();
        debug!("session reset");
        self.batch.reset();
    }

    pub fn dismiss_error(&mut self) {
        self.state.error = None;
    }
}
