use super::*;

impl NetconfManager {
    /// Creates a new NETCONF session manager.
    pub fn new() -> Self {
        // Cache up to 100 sessions. Evict after 5 minutes of inactivity.
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();

        Self { cache }
    }

    /// Gets a cached session or opens a new one with the secure default profile.
    pub async fn get(
        &self,
        params: &ConnectParams,
    ) -> Result<Arc<Mutex<NetconfSession>>, NetconfError> {
        self.get_with_security(params, ConnectionSecurityOptions::default())
            .await
    }

    /// Gets a cached session or opens a new one with explicit security options.
    pub async fn get_with_security(
        &self,
        params: &ConnectParams,
        security_options: ConnectionSecurityOptions,
    ) -> Result<Arc<Mutex<NetconfSession>>, NetconfError> {
        self.get_with_security_and_recording(params, security_options, None)
            .await
    }

    /// Gets a session and attaches a recorder with the given level.
    pub async fn get_with_recording_level(
        &self,
        params: &ConnectParams,
        security_options: ConnectionSecurityOptions,
        level: SessionRecordLevel,
    ) -> Result<(Arc<Mutex<NetconfSession>>, SessionRecorder), NetconfError> {
        let recorder = SessionRecorder::new(level);
        let session = self
            .get_with_security_and_recording(params, security_options, Some(recorder.clone()))
            .await?;
        Ok((session, recorder))
    }

    async fn get_with_security_and_recording(
        &self,
        params: &ConnectParams,
        security_options: ConnectionSecurityOptions,
        recorder: Option<SessionRecorder>,
    ) -> Result<Arc<Mutex<NetconfSession>>, NetconfError> {
        let device_addr = params.device_addr();

        // Check if a healthy, usable session exists in the cache
        if let Some(session) = self.cache.get(&device_addr).await {
            debug!("Cache hit: {}", device_addr);

            let mut guard = session.lock().await;
            if guard.is_reusable(&params.password, &security_options) {
                debug!("Cached session params match, reusing: {}", device_addr);
                if recorder.is_some() {
                    guard.set_recorder(recorder);
                }
                drop(guard);
                return Ok(session);
            }

            debug!(
                "Cached session {} is closed or params mismatch, recreating",
                device_addr
            );
            if let Err(e) = guard.close_session().await {
                debug!("Error closing old session: {} - {}", device_addr, e);
            }
            drop(guard);
            self.cache.invalidate(&device_addr).await;
        } else {
            debug!("Cache miss, opening new session for {}...", device_addr);
        }

        let session = NetconfSession::connect(params, security_options, recorder).await?;
        let session = Arc::new(Mutex::new(session));

        self.cache.insert(device_addr.clone(), session.clone()).await;
        debug!("New session for {} has been cached.", device_addr);

        Ok(session)
    }

    /// Caches a session opened outside the manager, e.g. over custom channels.
    ///
    /// The session should carry `params.password` through
    /// [`NetconfSession::bind_connection_params`], otherwise the next lookup
    /// treats it as stale and reconnects.
    pub async fn adopt(
        &self,
        params: &ConnectParams,
        session: NetconfSession,
    ) -> Arc<Mutex<NetconfSession>> {
        let device_addr = params.device_addr();
        let session = Arc::new(Mutex::new(session));
        if let Some(previous) = self.cache.remove(&device_addr).await {
            debug!("Replacing cached session for {}", device_addr);
            if let Err(e) = previous.lock().await.close_session().await {
                debug!("Error closing replaced session: {} - {}", device_addr, e);
            }
        }
        self.cache.insert(device_addr, session.clone()).await;
        session
    }

    /// Closes and forgets the cached session for `params`, if any.
    pub async fn close(&self, params: &ConnectParams) -> Result<(), NetconfError> {
        let device_addr = params.device_addr();
        let Some(session) = self.cache.remove(&device_addr).await else {
            debug!("No cached session for {}, nothing to close", device_addr);
            return Ok(());
        };
        let mut guard = session.lock().await;
        guard.close_session().await
    }
}

impl Default for NetconfManager {
    fn default() -> Self {
        Self::new()
    }
}
