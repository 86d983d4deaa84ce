use super::*;
use log::warn;

impl NetconfSession {
    /// Calculates SHA-256 hash of the password.
    fn calculate_password_hash(password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }

    /// Records the credentials and security profile this session stands for.
    ///
    /// `connect` does this itself. Sessions built with [`over_channels`]
    /// need it before they are handed to [`NetconfManager::adopt`].
    ///
    /// [`over_channels`]: NetconfSession::over_channels
    pub fn bind_connection_params(
        &mut self,
        password: &str,
        security_options: ConnectionSecurityOptions,
    ) {
        self.password_hash = Self::calculate_password_hash(password);
        self.security_options = security_options;
    }

    /// Checks if connection parameters match (used for cache validation).
    pub fn matches_connection_params(
        &self,
        password: &str,
        security_options: &ConnectionSecurityOptions,
    ) -> bool {
        if self.password_hash != Self::calculate_password_hash(password) {
            debug!("Password hash mismatch");
            return false;
        }

        if &self.security_options != security_options {
            debug!("Security options mismatch");
            return false;
        }

        true
    }

    /// A cached session is reused only while it is open and was opened
    /// with the same password and security options.
    pub fn is_reusable(
        &self,
        password: &str,
        security_options: &ConnectionSecurityOptions,
    ) -> bool {
        self.is_connected() && self.matches_connection_params(password, security_options)
    }

    /// Opens the `netconf` SSH subsystem and runs the hello exchange.
    pub async fn connect(
        params: &ConnectParams,
        security_options: ConnectionSecurityOptions,
        recorder: Option<SessionRecorder>,
    ) -> Result<NetconfSession, NetconfError> {
        let device_addr = params.device_addr();
        debug!(
            "{} Connecting with {} SSH profile (host key check: {})",
            device_addr,
            security_options.level,
            security_options.verifies_host_key()
        );

        let ssh_config = Config {
            preferred: security_options.preferred(),
            inactivity_timeout: Some(config::SSH_INACTIVITY_TIMEOUT),
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (params.addr.clone(), params.port),
            &params.user,
            AuthMethod::with_password(&params.password),
            security_options.server_check.clone(),
            ssh_config,
        )
        .await?;
        debug!("{} TCP connection successful", device_addr);

        let mut channel = client.get_channel().await?;
        channel
            .request_subsystem(true, config::NETCONF_SUBSYSTEM)
            .await?;
        debug!("{} NETCONF subsystem request successful", device_addr);

        let (sender_to_device, mut receiver_from_session) = mpsc::channel::<Vec<u8>>(256);
        let (sender_to_session, receiver_from_device) = mpsc::channel::<Vec<u8>>(256);

        let io_task_device_addr = device_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = receiver_from_session.recv() => {
                        match outgoing {
                            Some(data) => {
                                if let Err(e) = channel.data(&data[..]).await {
                                    debug!("{} Failed to send data to subsystem: {:?}", io_task_device_addr, e);
                                    break;
                                }
                            }
                            None => {
                                let _ = channel.eof().await;
                                break;
                            }
                        }
                    },
                    incoming = channel.wait() => {
                        match incoming {
                            Some(ChannelMsg::Data { ref data }) => {
                                if sender_to_session.send(data.to_vec()).await.is_err() {
                                    debug!("{} Session receiver dropped. Closing task.", io_task_device_addr);
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                debug!("{} Subsystem exited with status code: {}", io_task_device_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                                debug!("{} Subsystem sent EOF.", io_task_device_addr);
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
            debug!("{} NETCONF I/O task ended.", io_task_device_addr);
        });

        let mut session = Self::establish(
            Some(client),
            device_addr,
            sender_to_device,
            receiver_from_device,
            params.rpc_timeout,
            recorder,
        )
        .await?;
        session.bind_connection_params(&params.password, security_options);
        Ok(session)
    }

    /// Runs a NETCONF session over an existing pair of byte channels.
    ///
    /// `sender` carries framed bytes towards the server, `recv` delivers
    /// whatever the server writes, in arbitrary chunk sizes.
    pub async fn over_channels(
        device_addr: impl Into<String>,
        sender: Sender<Vec<u8>>,
        recv: Receiver<Vec<u8>>,
        rpc_timeout: Duration,
        recorder: Option<SessionRecorder>,
    ) -> Result<NetconfSession, NetconfError> {
        Self::establish(
            None,
            device_addr.into(),
            sender,
            recv,
            rpc_timeout,
            recorder,
        )
        .await
    }

    async fn establish(
        client: Option<Client>,
        device_addr: String,
        sender: Sender<Vec<u8>>,
        recv: Receiver<Vec<u8>>,
        rpc_timeout: Duration,
        recorder: Option<SessionRecorder>,
    ) -> Result<NetconfSession, NetconfError> {
        let mut session = Self {
            client,
            sender,
            recv,
            decoder: FrameDecoder::new(Framing::EndOfMessage),
            device_addr,
            hello: ServerHello::default(),
            next_message_id: config::FIRST_MESSAGE_ID,
            rpc_timeout,
            closed: false,
            password_hash: [0; 32],
            security_options: ConnectionSecurityOptions::default(),
            recorder,
        };

        session.send_message(&templates::client_hello()).await?;
        let raw = session.read_message().await.map_err(|e| match e {
            NetconfError::RpcTimeout(_) => {
                NetconfError::HelloError("timed out waiting for server hello".to_string())
            }
            other => other,
        })?;
        let hello = ServerHello::parse(&raw)?;

        if hello.supports(config::CAPABILITY_BASE_1_1) {
            session.decoder.set_framing(Framing::Chunked);
        } else if !hello.supports(config::CAPABILITY_BASE_1_0) {
            return Err(NetconfError::HelloError(
                "server supports neither base:1.0 nor base:1.1".to_string(),
            ));
        }
        debug!(
            "{} Hello exchanged: session-id={:?} capabilities={} framing={:?}",
            session.device_addr,
            hello.session_id,
            hello.capabilities.len(),
            session.decoder.framing()
        );

        if let Some(recorder) = session.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::SessionEstablished {
                device_addr: session.device_addr.clone(),
                session_id: hello.session_id.clone(),
                capabilities: hello.capabilities.clone(),
                framing: session.decoder.framing(),
            });
        }

        session.hello = hello;
        Ok(session)
    }

    /// Checks if the session can still carry RPCs.
    pub fn is_connected(&self) -> bool {
        if self.closed {
            return false;
        }
        match &self.client {
            Some(client) => !client.is_closed(),
            None => !self.sender.is_closed(),
        }
    }

    pub fn device_addr(&self) -> &str {
        &self.device_addr
    }

    /// Capability URIs from the server hello, in advertised order.
    pub fn server_capabilities(&self) -> &[String] {
        &self.hello.capabilities
    }

    pub fn session_id(&self) -> Option<&str> {
        self.hello.session_id.as_deref()
    }

    pub fn framing(&self) -> Framing {
        self.decoder.framing()
    }

    pub(super) fn set_recorder(&mut self, recorder: Option<SessionRecorder>) {
        self.recorder = recorder;
    }

    async fn send_message(&mut self, message: &str) -> Result<(), NetconfError> {
        if self.closed {
            return Err(NetconfError::ConnectClosedError);
        }
        trace!("{} >> {}", self.device_addr, message);
        let frame = framing::encode(self.decoder.framing(), message);
        self.sender.send(frame).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<String, NetconfError> {
        let decoder = &mut self.decoder;
        let recv = &mut self.recv;
        let recorder = self.recorder.as_ref();

        let result = tokio::time::timeout(self.rpc_timeout, async {
            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => return Ok(message),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
                match recv.recv().await {
                    Some(chunk) => {
                        if let Some(recorder) = recorder {
                            let _ = recorder
                                .record_raw_chunk(String::from_utf8_lossy(&chunk).into_owned());
                        }
                        decoder.push(&chunk);
                    }
                    None => return Err(NetconfError::ChannelDisconnectError),
                }
            }
        })
        .await;

        match result {
            Ok(message) => {
                let message = message?;
                trace!("{} << {}", self.device_addr, message);
                Ok(message)
            }
            Err(_) => Err(NetconfError::RpcTimeout(format!(
                "no reply from {} within {:?}",
                self.device_addr, self.rpc_timeout
            ))),
        }
    }

    /// Sends one RPC and waits for its reply.
    ///
    /// `operation` names the exchange in logs and recordings. Any `rpc-error`
    /// of severity `error` is returned as [`NetconfError::Rpc`].
    pub async fn rpc(&mut self, operation: &str, body: &str) -> Result<RpcReply, NetconfError> {
        if !self.is_connected() {
            return Err(NetconfError::ConnectClosedError);
        }

        let message_id = self.next_message_id.to_string();
        self.next_message_id += 1;
        let request = templates::rpc(&message_id, body);

        debug!(
            "{} Sending {} (message-id={})",
            self.device_addr, operation, message_id
        );
        self.send_message(&request).await?;
        let raw = self.read_message().await?;
        let reply = RpcReply::parse(&raw)?;

        if let Some(received) = reply.message_id.as_deref()
            && received != message_id
        {
            return Err(NetconfError::MessageIdMismatch {
                sent: message_id,
                received: received.to_string(),
            });
        }

        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::RpcExchange {
                message_id: message_id.clone(),
                operation: operation.to_string(),
                request,
                reply: raw,
                ok: reply.first_error().is_none(),
            });
        }

        for warning in reply.errors.iter().filter(|e| !e.is_error()) {
            warn!("{} {} returned {}", self.device_addr, operation, warning);
        }
        if let Some(err) = reply.first_error() {
            return Err(NetconfError::Rpc(err.clone()));
        }
        Ok(reply)
    }

    /// `<get>` with a subtree filter.
    pub async fn get(&mut self, filter: &str) -> Result<RpcReply, NetconfError> {
        self.rpc("get", &templates::get(filter)).await
    }

    /// `<get-config>` of a whole datastore.
    pub async fn get_config(&mut self, source: Datastore) -> Result<RpcReply, NetconfError> {
        self.rpc("get-config", &templates::get_config(source)).await
    }

    /// `<edit-config>`; `config` must be a complete `<config>` element.
    pub async fn edit_config(
        &mut self,
        target: Datastore,
        config: &str,
    ) -> Result<RpcReply, NetconfError> {
        self.rpc("edit-config", &templates::edit_config(target, config))
            .await
    }

    /// Downloads one YANG module and returns its text.
    pub async fn get_schema(&mut self, identifier: &str) -> Result<String, NetconfError> {
        let reply = self
            .rpc("get-schema", &templates::get_schema(identifier))
            .await?;
        if !reply.has_data {
            return Err(NetconfError::MissingField(format!(
                "<data> in get-schema reply for {identifier}"
            )));
        }
        Ok(reply.data_text)
    }

    /// Sends an arbitrary RPC body, e.g. a vendor-specific operation.
    pub async fn dispatch(&mut self, body: &str) -> Result<RpcReply, NetconfError> {
        self.rpc("dispatch", body).await
    }

    /// Sends `<close-session/>` and releases the transport.
    pub async fn close_session(&mut self) -> Result<(), NetconfError> {
        if self.closed {
            return Ok(());
        }
        debug!("Closing NETCONF session {}...", self.device_addr);

        let result = if self.is_connected() {
            match self.rpc("close-session", templates::CLOSE_SESSION).await {
                // The server may drop the subsystem right after replying.
                Ok(_) | Err(NetconfError::ChannelDisconnectError) => Ok(()),
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };

        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::SessionClosed {
                reason: "close_session_called".to_string(),
            });
        }

        self.recv.close();
        self.closed = true;
        info!("NETCONF session {} closed", self.device_addr);
        result
    }
}
