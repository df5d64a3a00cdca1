//! Headless host: feeds a walking viewer into the message client, tick by
//! tick, and carries out the viewer's scripted actions.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use waymark_config::{CliArgs, Config, ConfigError};
use waymark_core::{
    ClientEvent, ClientSettings, Credentials, GameState, HostFrame, LocationKey, MarkerKind,
    MessageClient, MessageError, RemoteGateway, SelectionPolicy, TickReport, VoteDirection,
    WorldId,
};
use waymark_gateway::{GatewayConfig, GatewayError, HttpGateway};

use crate::headless::HeadlessPresenter;
use crate::platform::{PlatformDirs, PlatformError};
use crate::tick_clock::TickClock;
use crate::viewer::{SimulatedViewer, visible_regions};

/// Edge length of the viewer's square walk, in tiles.
pub const ROUTE_SIDE: i32 = 96;

/// Tick on which the viewer leaves a message at its feet.
pub const PLACE_AT_TICK: u64 = 10;

/// Tick on which the viewer lists its own messages.
pub const LIST_AT_TICK: u64 = 15;

/// The viewer up-votes a nearby message of someone else this often.
pub const VOTE_EVERY_TICKS: u64 = 50;

/// A status line is logged this often.
pub const STATUS_EVERY_TICKS: u64 = 25;

/// Startup failures of the binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// The loaded config with CLI overrides applied.
pub fn effective_config(stored: &Config, args: &CliArgs) -> Config {
    let mut config = stored.clone();
    config.apply_cli_overrides(args);
    config
}

/// Client settings described by `config`.
pub fn client_settings(config: &Config) -> ClientSettings {
    ClientSettings {
        show_own: config.display.show_own_messages,
        show_others: config.display.show_other_messages,
        sync_enabled: config.sync.sync_messages,
        selection: SelectionPolicy {
            top_voted: config.selection.top_voted as usize,
            max_others: config.selection.max_others_per_region as usize,
        },
        ..ClientSettings::default()
    }
}

/// Gateway settings described by `config`.
pub fn gateway_config(config: &Config) -> GatewayConfig {
    GatewayConfig {
        base_url: config.sync.api_url.clone(),
        timeout: Duration::from_secs(u64::from(config.network.timeout_seconds.max(1))),
        worker_threads: config.network.worker_threads as usize,
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Owns the client, the headless presenter and the simulated viewer.
pub struct Driver<G: RemoteGateway> {
    client: MessageClient<G>,
    presenter: HeadlessPresenter,
    viewer: SimulatedViewer,
    name: String,
    world: WorldId,
    label_radius: u32,
    /// Config as read from disk, without CLI overrides; what gets persisted.
    stored: Config,
    config_dir: PathBuf,
    ticks: u64,
}

impl<G: RemoteGateway> Driver<G> {
    pub fn new(gateway: G, stored: Config, args: &CliArgs, config_dir: &Path) -> Self {
        let config = effective_config(&stored, args);
        let credentials = config
            .account
            .credentials()
            .and_then(|(key, name)| Credentials::from_parts(key, name));
        let client = MessageClient::new(gateway, client_settings(&config), credentials);
        let start = LocationKey::new(args.start_x, args.start_y, args.plane);

        Self {
            client,
            presenter: HeadlessPresenter::new(),
            viewer: SimulatedViewer::new(start, ROUTE_SIDE),
            name: args.viewer.clone(),
            world: WorldId(args.world),
            label_radius: config.display.clamped_radius(),
            stored,
            config_dir: config_dir.to_path_buf(),
            ticks: 0,
        }
    }

    /// Advances the host by one tick.
    pub fn step(&mut self) -> TickReport {
        self.ticks += 1;
        self.viewer.step();
        let position = self.viewer.position();
        self.presenter.load_scene(position);
        let regions = visible_regions(position);

        let frame = HostFrame {
            state: GameState::LoggedIn,
            viewer: Some(self.name.as_str()),
            world: self.world,
            visible_regions: Some(regions.as_slice()),
        };
        let report = self.client.tick(&frame, &mut self.presenter);
        if report.entered > 0 || report.left > 0 {
            debug!(
                "Regions: {} entered, {} left, {} messages evicted",
                report.entered, report.left, report.evicted
            );
        }

        self.run_script(position);
        self.handle_events();

        if self.ticks % STATUS_EVERY_TICKS == 0 {
            info!(
                "Tick {} at {}: {} regions tracked, {} markers drawn",
                self.ticks,
                position,
                self.client.tracker().len(),
                self.presenter.active_count()
            );
        }
        report
    }

    /// Despawns everything and forgets session state.
    pub fn shutdown(&mut self) {
        self.presenter.unload_scene();
        self.client.shutdown(&mut self.presenter);
    }

    pub fn client(&self) -> &MessageClient<G> {
        &self.client
    }

    pub fn presenter(&self) -> &HeadlessPresenter {
        &self.presenter
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn run_script(&mut self, position: LocationKey) {
        if self.ticks == PLACE_AT_TICK {
            let text = format!("{} was here", self.name);
            let result =
                self.client
                    .submit_message(&text, MarkerKind::Note, position, &mut self.presenter);
            report_rejection("place a message", result);
        }

        if self.ticks == LIST_AT_TICK {
            report_rejection("list messages", self.client.request_my_messages());
        }

        if self.ticks % VOTE_EVERY_TICKS == 0 {
            let candidate = self
                .client
                .labels(position, self.label_radius)
                .into_iter()
                .find(|label| {
                    !label.author.eq_ignore_ascii_case(&self.name) && !self.client.has_voted(&label.id)
                });
            if let Some(label) = candidate {
                info!("Voting up {:?} by {}", label.text, label.author);
                report_rejection("vote", self.client.vote(&label.id, VoteDirection::Up));
            }
        }
    }

    fn handle_events(&mut self) {
        for event in self.client.drain_events() {
            match event {
                ClientEvent::Notice(notice) => info!("{notice}"),
                ClientEvent::CredentialsIssued(credentials) => {
                    self.stored
                        .store_credentials(&credentials.api_key, &credentials.username);
                    self.persist();
                }
                ClientEvent::CredentialsRevoked => {
                    self.stored.clear_credentials();
                    self.persist();
                }
                ClientEvent::Deleted(id) => info!("Deleted message {id}"),
                ClientEvent::MineLoaded { world, messages } => {
                    info!("{} of your messages in world {world}", messages.len());
                    for message in &messages {
                        debug!("  {} at {}: {:?}", message.id, message.location, message.text);
                    }
                }
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.stored.save(&self.config_dir) {
            warn!("Failed to persist credentials: {e}");
        }
    }
}

fn report_rejection(action: &str, result: Result<(), MessageError>) {
    if let Err(e) = result {
        match e.user_notice() {
            Some(notice) => info!("{notice}"),
            None => warn!("Could not {action}: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolves directories, loads config, starts logging and the gateway, then
/// drives the client at the fixed tick rate until `--ticks` runs out.
pub fn run(args: &CliArgs) -> Result<(), AppError> {
    let dirs = PlatformDirs::resolve_and_create(args.config.as_deref())?;
    let stored = Config::load_or_create(&dirs.config_dir)?;
    let config = effective_config(&stored, args);
    waymark_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    info!("Config: {}", dirs.config_dir.display());
    info!(
        "{} entering world {} at ({}, {}, {}), backend {}",
        args.viewer, args.world, args.start_x, args.start_y, args.plane, config.sync.api_url
    );

    let gateway = HttpGateway::new(&gateway_config(&config))?;
    let mut driver = Driver::new(gateway, stored, args, &dirs.config_dir);
    let mut clock = TickClock::new();

    'ticking: loop {
        for _ in 0..clock.poll() {
            driver.step();
            if args.ticks.is_some_and(|limit| driver.ticks() >= limit) {
                break 'ticking;
            }
        }
        thread::sleep(clock.until_next());
    }

    driver.shutdown();
    info!("Stopped after {} ticks", driver.ticks());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use clap::Parser;
    use waymark_core::{GatewayCompletion, GatewayRequest, RegistrationState};

    #[derive(Default)]
    struct QueueGateway {
        submitted: RefCell<Vec<GatewayRequest>>,
        completions: RefCell<Vec<GatewayCompletion>>,
    }

    impl RemoteGateway for QueueGateway {
        fn submit(&self, request: GatewayRequest) {
            self.submitted.borrow_mut().push(request);
        }

        fn drain_completions(&self) -> Vec<GatewayCompletion> {
            self.completions.borrow_mut().drain(..).collect()
        }
    }

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["waymark", "--viewer", "Wanderer", "--world", "301"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    fn registered() -> Config {
        let mut config = Config::default();
        config.store_credentials("stored-key", "Wanderer");
        config
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.display.show_other_messages = false;
        config.selection.max_others_per_region = 12;
        let settings = client_settings(&config);
        assert!(settings.show_own);
        assert!(!settings.show_others);
        assert_eq!(settings.selection.max_others, 12);

        config.network.timeout_seconds = 0;
        assert_eq!(gateway_config(&config).timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_first_tick_fetches_scene_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = Driver::new(QueueGateway::default(), registered(), &args(&[]), dir.path());

        let report = driver.step();

        let submitted = driver.client().gateway().submitted.borrow();
        let fetches = submitted
            .iter()
            .filter(|r| matches!(r, GatewayRequest::FetchRegion { .. }))
            .count();
        assert_eq!(fetches, report.fetches_issued);
        assert_eq!(report.entered, visible_regions(driver.viewer.position()).len());
        assert!(
            submitted
                .iter()
                .any(|r| matches!(r, GatewayRequest::Verify { api_key } if api_key == "stored-key"))
        );
    }

    #[test]
    fn test_issued_credentials_are_persisted_without_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let stored = Config::default();
        let mut driver = Driver::new(
            QueueGateway::default(),
            stored,
            &args(&["--api-url", "http://127.0.0.1:9"]),
            dir.path(),
        );

        driver.step();
        assert!(
            driver
                .client()
                .gateway()
                .submitted
                .borrow()
                .iter()
                .any(|r| matches!(r, GatewayRequest::Register { username } if username == "Wanderer"))
        );

        driver
            .client()
            .gateway()
            .completions
            .borrow_mut()
            .push(GatewayCompletion::Registered {
                username: "Wanderer".into(),
                result: Ok("fresh-key".into()),
            });
        driver.step();

        assert_eq!(driver.client().registration_state(), RegistrationState::Registered);
        let saved = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(saved.account.credentials(), Some(("fresh-key", "Wanderer")));
        assert_eq!(saved.sync.api_url, Config::default().sync.api_url);
    }

    #[test]
    fn test_scripted_placement_is_local_without_sync() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = Driver::new(
            QueueGateway::default(),
            Config::default(),
            &args(&["--no-sync"]),
            dir.path(),
        );

        for _ in 0..PLACE_AT_TICK {
            driver.step();
        }

        assert_eq!(driver.presenter().active_count(), 1);
        let placed = driver
            .client()
            .lifecycle()
            .iter()
            .next()
            .map(|(record, _)| (record.author.clone(), record.id.is_local()));
        assert_eq!(placed, Some(("Wanderer".to_string(), true)));
    }

    #[test]
    fn test_shutdown_clears_markers() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = Driver::new(
            QueueGateway::default(),
            Config::default(),
            &args(&["--no-sync"]),
            dir.path(),
        );
        for _ in 0..PLACE_AT_TICK {
            driver.step();
        }

        driver.shutdown();

        assert_eq!(driver.presenter().handle_count(), 0);
        assert!(driver.client().lifecycle().is_empty());
    }
}
