//! Player session: connectivity and playlist state on top of a transport.
//!
//! The session turns transport outcomes into observable state. Every call
//! updates [`PlayerConnectivity`] and notifies subscribers, list state is only
//! touched on success, and no transport error escapes this layer.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use super::protocol::{parse_all_lists, parse_current_list, PlayerCommand};
use super::traits::PlayerTransport;
use super::{PlayerConnectivity, PlayerError, PlayerResult, PlayingRole};
use crate::config::Config;
use crate::error::ErrorCode;
use crate::events::{EventEmitter, PlayerEvent};
use crate::utils::now_millis;

/// Connection and list settings the session builds commands from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Player address.
    pub address: String,
    /// Control port.
    pub port: u16,
    /// Content directory on the player, including its trailing `/`.
    pub filepath: String,
    /// List played while presence is detected.
    pub active_list: String,
    /// List played while nobody is present.
    pub idle_list: String,
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            address: config.player_address.to_string(),
            port: config.player_port,
            filepath: config.content_filepath.clone(),
            active_list: config.active_list.clone(),
            idle_list: config.idle_list.clone(),
        }
    }
}

/// Stateful wrapper around a [`PlayerTransport`].
pub struct PlayerSession {
    transport: Arc<dyn PlayerTransport>,
    settings: RwLock<PlayerSettings>,
    connectivity: watch::Sender<PlayerConnectivity>,
    current_list: watch::Sender<Option<String>>,
    all_lists: watch::Sender<Vec<String>>,
    playing: RwLock<Option<PlayingRole>>,
    emitter: Arc<dyn EventEmitter>,
}

impl PlayerSession {
    /// Creates a session. Connectivity starts as [`PlayerConnectivity::Offline`].
    pub fn new(
        transport: Arc<dyn PlayerTransport>,
        settings: PlayerSettings,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let (connectivity, _) = watch::channel(PlayerConnectivity::Offline);
        let (current_list, _) = watch::channel(None);
        let (all_lists, _) = watch::channel(Vec::new());
        Self {
            transport,
            settings: RwLock::new(settings),
            connectivity,
            current_list,
            all_lists,
            playing: RwLock::new(None),
            emitter,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Switches the player to the active list.
    pub async fn play_active(&self) -> PlayerConnectivity {
        self.play(PlayingRole::Active).await
    }

    /// Switches the player to the idle list.
    pub async fn play_idle(&self) -> PlayerConnectivity {
        self.play(PlayingRole::Idle).await
    }

    async fn play(&self, role: PlayingRole) -> PlayerConnectivity {
        let settings = self.settings();
        let name = match role {
            PlayingRole::Active => settings.active_list.clone(),
            PlayingRole::Idle => settings.idle_list.clone(),
        };
        let command = PlayerCommand::SetList {
            filepath: &settings.filepath,
            name: &name,
        };

        log::info!("[Session] Play {:?} list {:?}", role, name);
        let outcome = self.send(&settings, &command).await;
        let connectivity = self.record_outcome(&outcome);

        if outcome.is_ok() {
            *self.playing.write() = Some(role);
            self.set_current_list(name);
        }
        connectivity
    }

    /// Asks the player which list is playing and records it.
    ///
    /// A reply without a usable line leaves the current list unchanged.
    pub async fn refresh_current_list(&self) -> PlayerConnectivity {
        let settings = self.settings();
        let outcome = self
            .send(&settings, &PlayerCommand::CurrentList)
            .await
            .and_then(|lines| parse_current_list(&lines, &settings.filepath));
        let connectivity = self.record_outcome(&outcome);

        if let Ok(name) = outcome {
            self.set_current_list(name);
        }
        connectivity
    }

    /// Asks the player for every stored list and records them.
    pub async fn refresh_all_lists(&self) -> PlayerConnectivity {
        let settings = self.settings();
        let outcome = self
            .send(&settings, &PlayerCommand::AllLists)
            .await
            .and_then(|lines| parse_all_lists(&lines, &settings.filepath));
        let connectivity = self.record_outcome(&outcome);

        if let Ok(lists) = outcome {
            log::info!("[Session] Player reports {} list(s)", lists.len());
            self.all_lists.send_replace(lists.clone());
            self.emitter.emit_player(PlayerEvent::AllListsChanged {
                lists,
                timestamp: now_millis(),
            });
        }
        connectivity
    }

    /// Replaces the settings used by subsequent commands.
    pub fn update_settings(&self, settings: PlayerSettings) {
        let mut current = self.settings.write();
        if *current != settings {
            log::info!(
                "[Session] Settings updated: player={}:{}, active={:?}, idle={:?}",
                settings.address,
                settings.port,
                settings.active_list,
                settings.idle_list
            );
            *current = settings;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns a copy of the current settings.
    pub fn settings(&self) -> PlayerSettings {
        self.settings.read().clone()
    }

    /// Returns the last observed connectivity.
    pub fn connectivity(&self) -> PlayerConnectivity {
        *self.connectivity.borrow()
    }

    /// Returns the list the session believes is playing.
    pub fn current_list(&self) -> Option<String> {
        self.current_list.borrow().clone()
    }

    /// Returns the lists from the last successful `DML` query.
    pub fn all_lists(&self) -> Vec<String> {
        self.all_lists.borrow().clone()
    }

    /// Returns which configured list was last switched to, if any.
    pub fn playing(&self) -> Option<PlayingRole> {
        *self.playing.read()
    }

    /// Subscribes to connectivity updates. Every attempt marks the value
    /// changed, even when it is the same as before.
    pub fn subscribe_connectivity(&self) -> watch::Receiver<PlayerConnectivity> {
        self.connectivity.subscribe()
    }

    /// Subscribes to current list updates.
    pub fn subscribe_current_list(&self) -> watch::Receiver<Option<String>> {
        self.current_list.subscribe()
    }

    /// Subscribes to all-lists updates.
    pub fn subscribe_all_lists(&self) -> watch::Receiver<Vec<String>> {
        self.all_lists.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn send(
        &self,
        settings: &PlayerSettings,
        command: &PlayerCommand<'_>,
    ) -> PlayerResult<Vec<String>> {
        let lines = self
            .transport
            .send_command(
                &settings.address,
                settings.port,
                &command.encode(),
                command.expects_response(),
            )
            .await?;
        Ok(lines.unwrap_or_default())
    }

    /// Updates connectivity from an outcome and notifies subscribers.
    fn record_outcome<T>(&self, outcome: &PlayerResult<T>) -> PlayerConnectivity {
        let connectivity = PlayerConnectivity::from_outcome(outcome);

        match outcome {
            Err(PlayerError::ParseAnomaly(msg)) => {
                log::warn!("[Session] Ignoring player reply: {}", msg);
            }
            Err(e) => {
                log::warn!("[Session] Player command failed [{}]: {}", e.code(), e);
            }
            Ok(_) => {}
        }

        let previous = self.connectivity.send_replace(connectivity);
        if previous != connectivity {
            log::info!("[Session] Player is {} (was {})", connectivity, previous);
        }
        self.emitter.emit_player(PlayerEvent::ConnectivityChanged {
            connectivity,
            timestamp: now_millis(),
        });
        connectivity
    }

    fn set_current_list(&self, name: String) {
        self.current_list.send_replace(Some(name.clone()));
        self.emitter.emit_player(PlayerEvent::CurrentListChanged {
            list: name,
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use crate::events::NoopEventEmitter;

    /// Transport that records commands and replays scripted outcomes.
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<(String, u16, String, bool)>>,
        outcomes: Mutex<VecDeque<PlayerResult<Option<Vec<String>>>>>,
    }

    impl ScriptedTransport {
        fn push(&self, outcome: PlayerResult<Option<Vec<String>>>) {
            self.outcomes.lock().push_back(outcome);
        }

        fn sent_commands(&self) -> Vec<String> {
            self.sent.lock().iter().map(|s| s.2.clone()).collect()
        }
    }

    #[async_trait]
    impl PlayerTransport for ScriptedTransport {
        async fn send_command(
            &self,
            address: &str,
            port: u16,
            command: &str,
            read_response: bool,
        ) -> PlayerResult<Option<Vec<String>>> {
            self.sent
                .lock()
                .push((address.into(), port, command.into(), read_response));
            self.outcomes.lock().pop_front().unwrap_or(Ok(None))
        }
    }

    fn settings() -> PlayerSettings {
        PlayerSettings {
            address: "10.0.0.5".into(),
            port: 8900,
            filepath: "c:/x/".into(),
            active_list: "code 42".into(),
            idle_list: "jamf".into(),
        }
    }

    fn session(transport: &Arc<ScriptedTransport>) -> PlayerSession {
        PlayerSession::new(
            Arc::clone(transport) as Arc<dyn PlayerTransport>,
            settings(),
            Arc::new(NoopEventEmitter),
        )
    }

    #[tokio::test]
    async fn play_active_records_list_and_role() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = session(&transport);
        assert_eq!(session.connectivity(), PlayerConnectivity::Offline);

        let connectivity = session.play_active().await;

        assert_eq!(connectivity, PlayerConnectivity::Online);
        assert_eq!(session.current_list().as_deref(), Some("code 42"));
        assert_eq!(session.playing(), Some(PlayingRole::Active));
        assert_eq!(transport.sent_commands(), vec!["SPLc:/x/code 42.dml\r\n"]);
        let sent = transport.sent.lock();
        assert_eq!(sent[0].0, "10.0.0.5");
        assert_eq!(sent[0].1, 8900);
        assert!(!sent[0].3, "set-list does not read a response");
    }

    #[tokio::test]
    async fn failed_play_leaves_list_untouched() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(PlayerError::ConnectionFailed("refused".into())));
        let session = session(&transport);

        let connectivity = session.play_idle().await;

        assert_eq!(connectivity, PlayerConnectivity::ConnectionError);
        assert_eq!(session.current_list(), None);
        assert_eq!(session.playing(), None);
    }

    #[tokio::test]
    async fn login_rejection_maps_to_login_error() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(PlayerError::LoginRejected("NO".into())));
        let session = session(&transport);

        assert_eq!(
            session.refresh_current_list().await,
            PlayerConnectivity::LoginError
        );
    }

    #[tokio::test]
    async fn refresh_current_list_parses_reply() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(Some(vec!["c:/x/MyList1234".into()])));
        let session = session(&transport);

        session.refresh_current_list().await;

        assert_eq!(session.current_list().as_deref(), Some("MyList"));
        assert_eq!(transport.sent_commands(), vec!["SCP\r\n"]);
        assert!(transport.sent.lock()[0].3);
    }

    #[tokio::test]
    async fn unusable_reply_keeps_previous_state_but_is_online() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(None));
        transport.push(Ok(Some(vec![String::new()])));
        let session = session(&transport);

        session.play_active().await;
        let connectivity = session.refresh_current_list().await;

        assert_eq!(connectivity, PlayerConnectivity::Online);
        assert_eq!(session.current_list().as_deref(), Some("code 42"));
    }

    #[tokio::test]
    async fn refresh_all_lists_collects_names() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Ok(Some(vec![
            "c:/x/code 42.dml20240101".into(),
            "c:/x/jamf.dml20240101".into(),
        ])));
        let session = session(&transport);

        session.refresh_all_lists().await;

        assert_eq!(session.all_lists(), vec!["code 42", "jamf"]);
        assert_eq!(transport.sent_commands(), vec!["DML\r\n"]);
    }

    #[tokio::test]
    async fn every_attempt_notifies_connectivity_subscribers() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(PlayerError::ConnectionFailed("down".into())));
        transport.push(Err(PlayerError::ConnectionFailed("down".into())));
        let session = session(&transport);
        let mut rx = session.subscribe_connectivity();

        session.play_active().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PlayerConnectivity::ConnectionError);

        session.play_active().await;
        assert!(rx.has_changed().unwrap(), "repeat errors still notify");
    }

    #[tokio::test]
    async fn updated_settings_apply_to_next_command() {
        let transport = Arc::new(ScriptedTransport::default());
        let session = session(&transport);

        session.update_settings(PlayerSettings {
            idle_list: "lobby".into(),
            ..settings()
        });
        session.play_idle().await;

        assert_eq!(transport.sent_commands(), vec!["SPLc:/x/lobby.dml\r\n"]);
        assert_eq!(session.current_list().as_deref(), Some("lobby"));
    }
}
