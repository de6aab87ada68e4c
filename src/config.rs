// src/config.rs
use crate::domain::action::Action;
use crate::infrastructure::store::Model;
use std::collections::HashSet;

/// Reference to an already-defined model, by name or by handle. Both forms
/// are accepted wherever a model is configured.
#[derive(Clone)]
pub enum ModelRef {
    Name(String),
    Handle(Model),
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Model> for ModelRef {
    fn from(model: Model) -> Self {
        Self::Handle(model)
    }
}

impl From<&Model> for ModelRef {
    fn from(model: &Model) -> Self {
        Self::Handle(model.clone())
    }
}

/// Immutable per-binding configuration, constructed once at bind time.
///
/// Defaults: log rows outlive their target (`persistent = true`) and only
/// `update` entries carry field-level changes.
#[derive(Clone)]
pub struct TrackerConfig {
    user_model: ModelRef,
    persistent: bool,
    tracked_actions: HashSet<Action>,
}

impl TrackerConfig {
    pub fn new(user_model: impl Into<ModelRef>) -> Self {
        Self {
            user_model: user_model.into(),
            persistent: true,
            tracked_actions: HashSet::from([Action::Update]),
        }
    }

    /// With `persistent = false`, deleting a tracked row cascades into its
    /// log rows; the default leaves them behind as orphans.
    #[must_use]
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Which actions carry field-level `changes` on their entries. `find`
    /// is not accepted here; bind rejects it.
    #[must_use]
    pub fn with_tracked_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.tracked_actions = actions.into_iter().collect();
        self
    }

    pub fn user_model(&self) -> &ModelRef {
        &self.user_model
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn tracked_actions(&self) -> &HashSet<Action> {
        &self.tracked_actions
    }
}
