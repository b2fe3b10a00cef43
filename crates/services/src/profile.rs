//! Profile container: the signed-in user's own profile row.

use std::sync::Arc;

use domains::{DomainError, Profile, ProfileRepository, ProfileUpdate, Result, Session};
use tokio::sync::watch;

use crate::state::{user_message, StateCell};

pub const FETCH_PROFILE_FAILED: &str = "failed to fetch profile";
pub const UPDATE_PROFILE_FAILED: &str = "failed to update profile";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub profile: Option<Profile>,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct ProfileStore {
    profiles: Arc<dyn ProfileRepository>,
    session: watch::Receiver<Option<Session>>,
    state: StateCell<ProfileState>,
}

impl ProfileStore {
    pub fn new(profiles: Arc<dyn ProfileRepository>, session: watch::Receiver<Option<Session>>) -> Self {
        Self { profiles, session, state: StateCell::new(ProfileState::default()) }
    }

    pub fn snapshot(&self) -> ProfileState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    pub fn clear_error(&self) {
        self.state.update(|s| s.error = None);
    }

    fn require_session(&self) -> Result<Session> {
        self.session.borrow().clone().ok_or(DomainError::Unauthenticated)
    }

    fn begin_loading(&self) {
        self.state.update(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    fn record_failure(&self, context: &str, err: &DomainError) {
        tracing::error!(error = %err, "{context}");
        let message = user_message(context, err);
        self.state.update(|s| s.error = Some(message));
    }

    fn fail_loading(&self, context: &str, err: &DomainError) {
        tracing::error!(error = %err, "{context}");
        let message = user_message(context, err);
        self.state.update(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    /// Loads the viewer's profile. A missing row is reported as a failure.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_profile(&self) {
        self.begin_loading();
        let result = async {
            let session = self.require_session()?;
            self.profiles
                .find_profile(&session, session.user_id())
                .await?
                .ok_or_else(|| DomainError::not_found("profile", session.user_id()))
        }
        .await;

        match result {
            Ok(profile) => {
                tracing::info!(user_id = %profile.id, "profile fetched");
                self.state.update(|s| {
                    s.profile = Some(profile);
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(FETCH_PROFILE_FAILED, &e),
        }
    }

    /// Updates bio and full name. On failure the previous profile stays and
    /// the error is both recorded and returned.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let session = match update.validate().and_then(|()| self.require_session()) {
            Ok(session) => session,
            Err(e) => {
                self.record_failure(UPDATE_PROFILE_FAILED, &e);
                return Err(e);
            }
        };
        self.begin_loading();

        let result = self.profiles.update_profile(&session, session.user_id(), update).await;
        match &result {
            Ok(profile) => {
                tracing::info!(user_id = %profile.id, "profile updated");
                let profile = profile.clone();
                self.state.update(|s| {
                    s.profile = Some(profile);
                    s.is_loading = false;
                });
            }
            Err(e) => self.fail_loading(UPDATE_PROFILE_FAILED, e),
        }
        result
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore").field("state", &self.state).finish_non_exhaustive()
    }
}
