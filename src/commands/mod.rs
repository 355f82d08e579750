pub mod declarative;
pub mod lookup;
pub mod tracked;

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use labkit::Client;
use std::path::PathBuf;

use crate::Context;
use crate::config::Settings;
use crate::kinds::ResourceFactory;
use crate::manifest::Manifest;
use crate::state::StateFile;

/// Settings, manifest and state for one invocation
pub struct Workspace {
    pub settings: Settings,
    pub manifest: Manifest,
    pub state: StateFile,
    pub state_path: PathBuf,
}

impl Workspace {
    pub fn open(ctx: &Context) -> Result<Self> {
        let settings = Settings::load()?;
        let manifest_path = ctx
            .manifest
            .clone()
            .unwrap_or_else(|| settings.manifest_path());
        let state_path = ctx.state.clone().unwrap_or_else(|| settings.state_path());

        let manifest = Manifest::load(&manifest_path)?;
        let state = StateFile::load(&state_path)?;
        log::info!(
            "{} declared in {}, {} tracked in {}",
            manifest.len(),
            manifest_path.display(),
            state.resources.len(),
            state_path.display()
        );

        Ok(Self {
            settings,
            manifest,
            state,
            state_path,
        })
    }

    /// Resource factory talking to the configured GitLab instance
    pub fn factory(&self) -> Result<ResourceFactory> {
        let client = client(&self.settings)?;
        Ok(ResourceFactory::new(client, self.settings.poll_config()))
    }

    pub fn save_state(&mut self) -> Result<()> {
        self.state.touch(&self.state_path)
    }
}

/// Client for the configured GitLab instance
pub fn client(settings: &Settings) -> Result<Client> {
    let token = settings.token();
    if token.is_none() {
        log::warn!(
            "{} is not set; requests to {} are unauthenticated",
            settings.token_env,
            settings.base_url
        );
    }
    Client::new(settings.base_url.clone(), token).context("Failed to set up the GitLab client")
}

/// List the resource kinds that can be declared
pub fn kinds() {
    for kind in labkit::KINDS {
        println!("{}", kind.bold());
    }
}
