use crate::catalog::{Catalog, FilterModel};
use crate::error::EngineError;
use crate::event::{Command, Timer};
use crate::ingest::KlineBook;
use crate::scheduler::Scheduler;
use crate::tracker::{RequestKind, RequestTracker};
use api_client::{
    Completion, ConfigRequest, DataResponse, Endpoints, HttpRequest, KlinesResponse,
    LoginResponse, ResultCode, StatusResponse, Transport, TransportError, WireUserMessage,
    parse_element, parse_response,
};
use configuration::{CredentialStore, SessionConfig};
use core_types::{Credential, FilterRule};
use events::{ClientEvent, DetectionNotice, EventLog, LogLevel, LogMessage};
use std::time::{Duration, Instant};

pub const CONNECTION_LOST: &str = "Connection is lost. Please wait for relogin...";
pub const REQUEST_EXPIRED: &str = "request expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Registering,
    LoggingIn,
    Active,
    Recovering,
}

/// The client's view of its server session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned id; 0 when there is no session.
    pub session_id: i64,
    pub state: SessionState,
    pub consecutive_errors: u32,
    /// Bumped on every reset. Timers scheduled in an earlier epoch are void.
    pub epoch: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            session_id: 0,
            state: SessionState::Anonymous,
            consecutive_errors: 0,
            epoch: 0,
        }
    }

    fn reset(&mut self, state: SessionState) {
        self.session_id = 0;
        self.state = state;
        self.epoch += 1;
    }
}

/// Tunables of the session loop.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub backoff: Duration,
    pub error_threshold: u32,
    pub stale_request_age: Duration,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            backoff: config.backoff(),
            error_threshold: config.error_threshold,
            stale_request_age: config.stale_request_age(),
        }
    }
}

/// The session state machine.
///
/// Owns every piece of mutable client state and is driven one event at a
/// time: transport completions, timer firings, user commands and the
/// maintenance sweep. It never blocks; requests go out through the
/// [`Transport`] and delays through the [`Scheduler`].
pub struct SessionMachine<T, C, S>
where
    T: Transport,
    C: Scheduler,
    S: CredentialStore,
{
    transport: T,
    scheduler: C,
    store: S,
    endpoints: Endpoints,
    settings: SessionSettings,

    credential: Credential,
    session: Session,
    tracker: RequestTracker,

    catalog: Catalog,
    filter: FilterModel,
    klines: KlineBook,
    events: EventLog,

    // Rules to push once the next catalog arrives.
    pending_filter: Option<Vec<FilterRule>>,
}

impl<T, C, S> SessionMachine<T, C, S>
where
    T: Transport,
    C: Scheduler,
    S: CredentialStore,
{
    pub fn new(transport: T, scheduler: C, store: S, endpoints: Endpoints, settings: SessionSettings) -> Self {
        Self {
            transport,
            scheduler,
            store,
            endpoints,
            settings,
            credential: Credential::default(),
            session: Session::new(),
            tracker: RequestTracker::new(),
            catalog: Catalog::new(),
            filter: FilterModel::new(),
            klines: KlineBook::new(),
            events: EventLog::new(),
            pending_filter: None,
        }
    }

    /// Rules to push after the first successful catalog fetch.
    pub fn with_startup_filter(mut self, rules: Vec<FilterRule>) -> Self {
        if !rules.is_empty() {
            self.pending_filter = Some(rules);
        }
        self
    }

    /// Loads the stored credential and opens the session: registers a new
    /// user when there is none, logs in otherwise.
    ///
    /// An unreadable credential file is left as it is and nothing is sent.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.credential = match self.store.load() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::error!(error = %e, "Could not load the stored credential.");
                self.events.error(format!(
                    "Could not load the stored credential: {e}. Fix the file or run `credentials reset`."
                ));
                return Err(EngineError::Credentials(e));
            }
        };

        if self.credential.is_empty() {
            self.credential = Credential::generate(self.credential.auto_login);
            self.persist_credential();
            tracing::info!(user = %self.credential.user, "No stored credential; registering a new user.");
            self.issue(RequestKind::NewUser);
        } else {
            tracing::info!(user = %self.credential.user, "Logging in with the stored credential.");
            self.issue(RequestKind::Login);
        }
        Ok(())
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        let Some(kind) = self.tracker.resolve(completion.handle) else {
            return;
        };
        match completion.outcome {
            Ok(body) => {
                self.session.consecutive_errors = 0;
                self.dispatch_response(kind, &body);
            }
            Err(error) => self.on_transport_error(kind, error),
        }
    }

    pub fn handle_timer(&mut self, timer: Timer) {
        if timer.epoch != self.session.epoch {
            tracing::debug!(action = %timer.action, epoch = timer.epoch, "Ignoring timer from an earlier session.");
            return;
        }
        if !self.accepts(timer.action) {
            tracing::debug!(action = %timer.action, state = ?self.session.state, "Ignoring timer that does not fit the session state.");
            return;
        }
        self.issue(timer.action);
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::ReplaceFilter(rules) => {
                self.filter.replace_rules(rules);
                self.filter.rebuild_editor(&self.catalog);
                self.push_filter();
            }
            Command::PushFilter => self.push_filter(),
            // Consumed by the event loop.
            Command::Shutdown => {}
        }
    }

    /// Expires requests that never completed, treating each as a transport
    /// error so its loop is retried.
    pub fn sweep(&mut self, now: Instant) {
        let epoch = self.session.epoch;
        for (handle, kind) in self.tracker.evict_stale(now, self.settings.stale_request_age) {
            tracing::warn!(%handle, %kind, "Request expired.");
            self.on_transport_error(kind, TransportError::new(0, REQUEST_EXPIRED));
            // A forced relogin already discarded everything else.
            if self.session.epoch != epoch {
                break;
            }
        }
    }

    // --- Accessors ---

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn filter(&self) -> &FilterModel {
        &self.filter
    }

    pub fn klines(&self) -> &KlineBook {
        &self.klines
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut C {
        &mut self.scheduler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // --- Requests ---

    fn issue(&mut self, kind: RequestKind) {
        let Some(request) = self.build_request(kind) else {
            return;
        };
        match kind {
            RequestKind::NewUser => self.session.state = SessionState::Registering,
            RequestKind::Login => self.session.state = SessionState::LoggingIn,
            _ => {}
        }
        let in_flight = self.transport.send(request);
        let handle = self.tracker.issue(kind, in_flight, Instant::now());
        tracing::debug!(%handle, %kind, "Request issued.");
    }

    fn build_request(&mut self, kind: RequestKind) -> Option<HttpRequest> {
        let session_id = self.session.session_id;
        let request = match kind {
            RequestKind::NewUser => self.endpoints.new_user(&self.credential),
            RequestKind::Login => self.endpoints.login(&self.credential),
            RequestKind::FetchCatalog => self.endpoints.klines(session_id),
            RequestKind::FetchData => self.endpoints.data(session_id),
            RequestKind::PushConfig => {
                let body = self.config_body()?;
                self.endpoints.config(session_id, body)
            }
        };
        Some(request)
    }

    fn config_body(&mut self) -> Option<Vec<u8>> {
        let rules = match self.filter.serialize() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(error = %e, "Filter not pushed.");
                self.events.warn(format!("Filter not sent: {e}"));
                return None;
            }
        };
        match (ConfigRequest { filter: &rules }).to_body() {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::error!(error = %e, "Could not encode the filter.");
                None
            }
        }
    }

    fn schedule(&mut self, action: RequestKind) {
        let timer = Timer {
            action,
            epoch: self.session.epoch,
        };
        tracing::debug!(%action, delay_ms = self.settings.backoff.as_millis() as u64, "Scheduling request.");
        self.scheduler.schedule(self.settings.backoff, timer);
    }

    /// Whether a delayed request still makes sense in the current state.
    fn accepts(&self, action: RequestKind) -> bool {
        use SessionState::*;
        match action {
            RequestKind::NewUser => matches!(self.session.state, Registering | Recovering),
            RequestKind::Login => matches!(self.session.state, Anonymous | LoggingIn | Recovering),
            RequestKind::FetchCatalog | RequestKind::FetchData | RequestKind::PushConfig => {
                self.session.state == Active
            }
        }
    }

    fn push_filter(&mut self) {
        if self.session.state != SessionState::Active {
            tracing::info!("Not logged in; the filter will be pushed after the next catalog fetch.");
            self.pending_filter = Some(self.filter.rules().to_vec());
            return;
        }
        self.issue(RequestKind::PushConfig);
    }

    fn persist_credential(&mut self) {
        if let Err(e) = self.store.save(&self.credential) {
            tracing::error!(error = %e, "Could not save the credential.");
            self.events.error(format!("Could not save the credential: {e}"));
        }
    }

    // --- Failures ---

    fn on_transport_error(&mut self, kind: RequestKind, error: TransportError) {
        self.session.consecutive_errors += 1;
        tracing::warn!(
            %kind,
            code = error.code,
            message = %error.message,
            consecutive = self.session.consecutive_errors,
            "Transport error."
        );

        if self.session.consecutive_errors > self.settings.error_threshold {
            self.force_relogin(kind);
        } else {
            self.schedule(kind);
        }
    }

    fn force_relogin(&mut self, failed: RequestKind) {
        let discarded = self.tracker.discard_all();
        self.session.reset(SessionState::Recovering);
        self.session.consecutive_errors = 0;
        tracing::error!(%failed, discarded, "Too many consecutive errors; forcing relogin.");
        self.events.error(CONNECTION_LOST);

        let recovery = match failed {
            RequestKind::NewUser => RequestKind::NewUser,
            _ => RequestKind::Login,
        };
        self.schedule(recovery);
    }

    // Malformed bodies: everything except a config push is tried again.
    fn on_protocol_error(&mut self, kind: RequestKind, error: api_client::ApiError) {
        tracing::error!(%kind, error = %error, "Unreadable response.");
        if kind != RequestKind::PushConfig {
            self.schedule(kind);
        }
    }

    // --- Responses ---

    fn dispatch_response(&mut self, kind: RequestKind, body: &[u8]) {
        let outcome = match kind {
            RequestKind::NewUser => parse_response::<StatusResponse>(body).map(|r| self.on_new_user(r)),
            RequestKind::Login => parse_response::<LoginResponse>(body).map(|r| self.on_login(r)),
            RequestKind::FetchCatalog => parse_response::<KlinesResponse>(body).map(|r| self.on_catalog(r)),
            RequestKind::FetchData => parse_response::<DataResponse>(body).map(|r| self.on_data(r)),
            RequestKind::PushConfig => parse_response::<StatusResponse>(body).map(|r| self.on_config(r)),
        };
        if let Err(e) = outcome {
            self.on_protocol_error(kind, e);
        }
    }

    fn on_new_user(&mut self, response: StatusResponse) {
        if response.result.is_ok() {
            tracing::info!(user = %self.credential.user, "New user registered.");
            self.issue(RequestKind::Login);
            return;
        }

        tracing::warn!(result = ?response.result, message = %response.message, "Registration refused; trying another user.");
        self.credential = Credential::generate(self.credential.auto_login);
        self.persist_credential();
        self.issue(RequestKind::NewUser);
    }

    fn on_login(&mut self, response: LoginResponse) {
        if !response.result.is_ok() {
            tracing::warn!(result = ?response.result, message = %response.message, "Login refused.");
            self.events.warn(response.message);
            self.schedule(RequestKind::Login);
            return;
        }
        if response.session_id <= 0 {
            tracing::error!(session_id = response.session_id, "Login accepted without a session id.");
            self.events.warn("Login answer carried no session id; retrying.");
            self.schedule(RequestKind::Login);
            return;
        }

        self.session.session_id = response.session_id;
        self.session.state = SessionState::Active;
        self.filter.apply_server_filter(&response.filter);
        self.filter.rebuild_editor(&self.catalog);

        let user = self.credential.user.clone();
        tracing::info!(session_id = response.session_id, %user, "Session active.");
        self.events.info(format!("Login successfully as: {user}"));
        self.events.push(ClientEvent::SessionActive {
            session_id: response.session_id,
            user,
        });
        self.issue(RequestKind::FetchCatalog);
    }

    fn on_catalog(&mut self, response: KlinesResponse) {
        if !response.result.is_ok() {
            tracing::warn!(result = ?response.result, message = %response.message, "Catalog request refused.");
            self.schedule(RequestKind::FetchCatalog);
            return;
        }

        self.catalog.apply_catalog(&response.klines);
        self.filter.rebuild_editor(&self.catalog);
        self.events.push(ClientEvent::CatalogUpdated {
            exchanges: self.catalog.exchange_count(),
            symbols: self.catalog.symbol_count(),
        });

        if let Some(rules) = self.pending_filter.take() {
            self.filter.replace_rules(rules);
            self.filter.rebuild_editor(&self.catalog);
            self.issue(RequestKind::PushConfig);
        }
        self.schedule(RequestKind::FetchData);
    }

    fn on_data(&mut self, response: DataResponse) {
        match response.result {
            ResultCode::Ok => {
                for id in self.klines.ingest(&response.detect_klines) {
                    if let Some(detection) = self.klines.get(id) {
                        let notice = DetectionNotice::from(detection);
                        self.events.push(ClientEvent::Detection(notice));
                    }
                }
                for value in &response.user_messages {
                    let message = match parse_element::<WireUserMessage>(value) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::error!(error = %e, "Dropping server message.");
                            continue;
                        }
                    };
                    match LogLevel::from_server(&message.level) {
                        Some(level) => self
                            .events
                            .push(ClientEvent::Log(LogMessage::new(level, message.message))),
                        None => tracing::debug!(level = %message.level, message = %message.message, "Server message not shown."),
                    }
                }
                self.schedule(RequestKind::FetchData);
            }
            ResultCode::Logout => {
                tracing::warn!(message = %response.message, "Session closed by the server.");
                self.session.reset(SessionState::Anonymous);
                self.events.warn(format!("Session closed by server: {}", response.message));
                self.schedule(RequestKind::Login);
            }
            ResultCode::Other(result) => {
                tracing::warn!(%result, message = %response.message, "Data request refused.");
                self.schedule(RequestKind::FetchData);
            }
        }
    }

    fn on_config(&mut self, response: StatusResponse) {
        if response.result.is_ok() {
            tracing::info!(rules = self.filter.rules().len(), "Filter accepted by the server.");
            self.events.info("Filter applied.");
        } else {
            tracing::warn!(result = ?response.result, message = %response.message, "Filter refused by the server.");
            self.events.warn(format!("Filter not applied: {}", response.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{CallGuard, HandleSequence, InFlight};
    use configuration::MemoryCredentialStore;

    #[derive(Default)]
    struct NullTransport {
        handles: HandleSequence,
        sent: Vec<HttpRequest>,
    }

    impl Transport for NullTransport {
        fn send(&mut self, request: HttpRequest) -> InFlight {
            self.sent.push(request);
            InFlight {
                handle: self.handles.next(),
                guard: CallGuard::detached(),
            }
        }
    }

    #[derive(Default)]
    struct NullScheduler {
        timers: Vec<Timer>,
    }

    impl Scheduler for NullScheduler {
        fn schedule(&mut self, _delay: Duration, timer: Timer) {
            self.timers.push(timer);
        }
    }

    fn machine() -> SessionMachine<NullTransport, NullScheduler, MemoryCredentialStore> {
        SessionMachine::new(
            NullTransport::default(),
            NullScheduler::default(),
            MemoryCredentialStore::new(Credential::new("alice", "secret", true)),
            Endpoints::new("http://h"),
            SessionSettings::from(&SessionConfig::default()),
        )
    }

    #[test]
    fn a_stored_credential_logs_in_directly() {
        let mut machine = machine();
        machine.start().unwrap();
        assert_eq!(machine.state(), SessionState::LoggingIn);
        assert_eq!(machine.tracker().pending(RequestKind::Login), 1);
        assert!(machine.transport().sent[0].url.starts_with("http://h/login/"));
    }

    #[test]
    fn data_timers_are_refused_without_a_session() {
        let mut machine = machine();
        machine.start().unwrap();
        machine.handle_timer(Timer {
            action: RequestKind::FetchData,
            epoch: 0,
        });
        assert_eq!(machine.transport().sent.len(), 1);
    }

    #[test]
    fn filter_replaced_before_login_waits_for_the_catalog() {
        let mut machine = machine();
        machine.start().unwrap();
        machine.handle_command(Command::ReplaceFilter(Vec::new()));
        assert_eq!(machine.tracker().pending(RequestKind::PushConfig), 0);
        assert!(machine.pending_filter.is_some());
    }

    #[test]
    fn the_session_epoch_moves_on_every_reset() {
        let mut session = Session::new();
        session.session_id = 7;
        session.reset(SessionState::Recovering);
        assert_eq!(session.epoch, 1);
        assert_eq!(session.session_id, 0);
        assert_eq!(session.state, SessionState::Recovering);
    }
}
