// ── HomeControl facade ──
//
// Full lifecycle of one gateway connection: directory lookup, discovery,
// session, inventory, push channel and the dispatcher task. All writes go
// through `execute`.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use homecontrol_api::{
    ConnectionState, DirectoryClient, GatewayDescriptor, LocalDiscovery, PushChannel,
    PushNotification, RpcClient, SessionEstablisher, SessionSlot, TransportConfig, ZwaveProduct,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::HomeControlConfig;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::model::uid::{device_uid, setting_device_uid};
use crate::model::{Device, Property};
use crate::store::{PropertyStore, Publisher};

/// The main entry point for consumers.
///
/// Cheaply cloneable. Dropping every clone without calling
/// [`disconnect()`](Self::disconnect) still stops the push channel, but
/// does not wait for it.
#[derive(Clone)]
pub struct HomeControl {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<GatewayDescriptor>,
    directory: Arc<DirectoryClient>,
    rpc: RpcClient,
    store: Arc<PropertyStore>,
    publisher: Arc<Publisher>,
    push: Mutex<Option<PushChannel>>,
    push_state: watch::Receiver<ConnectionState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    establish_timeout: Duration,
}

impl HomeControl {
    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the configured gateway.
    ///
    /// Resolves the gateway in the directory, looks for it in the LAN
    /// when zeroconf is enabled, establishes a session, loads every
    /// device and starts the push channel. Does not wait for the channel
    /// to open; see [`wait_until_established()`](Self::wait_until_established).
    pub async fn connect(
        config: HomeControlConfig,
        directory: Arc<DirectoryClient>,
    ) -> Result<Self, CoreError> {
        let gateway_id = match config.gateway_id.clone() {
            Some(id) => id,
            None => directory
                .gateway_ids()
                .await?
                .into_iter()
                .next()
                .ok_or(CoreError::NoGateway)?,
        };
        let gateway = Arc::new(
            GatewayDescriptor::from_directory(&gateway_id, Arc::clone(&directory)).await?,
        );
        info!(gateway = %gateway.id(), "gateway resolved");

        let local_addr = if config.zeroconf {
            LocalDiscovery::new(&gateway, config.discovery.clone())?
                .discover()
                .await
        } else {
            None
        };
        match local_addr {
            Some(addr) => debug!(%addr, "gateway found in LAN"),
            None => debug!("gateway not found in LAN"),
        }

        let transport = TransportConfig {
            timeout: config.rpc_timeout,
            cookie_jar: None,
        };
        let establisher = Arc::new(SessionEstablisher::new(
            Arc::clone(&gateway),
            transport,
            config.handshake.clone(),
        ));
        let session = establisher.establish(local_addr).await?;
        let slot: SessionSlot = Arc::new(ArcSwap::from_pointee(session));
        let rpc = RpcClient::new(slot, Arc::clone(&gateway)).with_timeout(config.rpc_timeout);

        let store = Arc::new(PropertyStore::new());
        let publisher = Arc::new(Publisher::new());
        let inventory = Inventory::new(rpc.clone(), Arc::clone(&store), Arc::clone(&publisher));
        inventory.load_all().await?;

        let (push, notifications) =
            PushChannel::start(rpc.clone(), establisher, local_addr, config.push.clone());
        let push_state = push.subscribe_state();

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            Arc::clone(&gateway),
        );
        let task = tokio::spawn(run_dispatcher(
            notifications,
            dispatcher,
            inventory,
            cancel.clone(),
        ));

        info!(devices = store.len(), "connected");
        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                directory,
                rpc,
                store,
                publisher,
                push: Mutex::new(Some(push)),
                push_state,
                dispatcher: Mutex::new(Some(task)),
                cancel,
                establish_timeout: config.establish_timeout,
            }),
        })
    }

    /// Close the push channel and stop the dispatcher. Idempotent.
    pub async fn disconnect(&self) {
        if let Some(push) = self.inner.push.lock().await.take() {
            push.shutdown().await;
        }
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.dispatcher.lock().await.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "dispatcher task ended abnormally");
            }
        }
        info!("disconnected");
    }

    /// Wait for the push channel to open, up to the configured
    /// establish timeout.
    pub async fn wait_until_established(&self) -> Result<(), CoreError> {
        let timeout = self.inner.establish_timeout;
        let mut rx = self.inner.push_state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|s| *s == ConnectionState::Open)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoreError::GatewayOffline {
                reason: "push channel stopped".into(),
            }),
            Err(_) => Err(CoreError::GatewayOffline {
                reason: format!("push channel not established within {}s", timeout.as_secs()),
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.push_state.borrow()
    }

    /// Watch push channel state transitions.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.push_state.clone()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn gateway(&self) -> &Arc<GatewayDescriptor> {
        &self.inner.gateway
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.inner.publisher
    }

    pub fn store(&self) -> &Arc<PropertyStore> {
        &self.inner.store
    }

    pub fn devices(&self) -> Vec<Device> {
        self.inner.store.devices()
    }

    pub fn device(&self, uid: &str) -> Option<Device> {
        self.inner.store.device(uid)
    }

    /// Z-Wave product metadata for a device, from the directory.
    pub async fn product_info(&self, uid: &str) -> Result<ZwaveProduct, CoreError> {
        let device = self.device(uid).ok_or_else(|| CoreError::DeviceNotFound {
            uid: uid.to_owned(),
        })?;
        Ok(self
            .inner
            .directory
            .zwave_product(
                &device.manufacturer_id,
                &device.product_type_id,
                &device.product_id,
            )
            .await?)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Execute a write on the gateway.
    ///
    /// Returns `true` when the gateway applied it (status 1); the local
    /// property is updated in that case only.
    pub async fn execute(&self, command: Command) -> Result<bool, CoreError> {
        let owner = owner_of(&command).to_owned();
        let device = self
            .inner
            .store
            .device(&owner)
            .ok_or_else(|| CoreError::DeviceNotFound { uid: owner.clone() })?;
        validate(&device, &command)?;

        let (operation, args) = command.operation();
        let status = self
            .inner
            .rpc
            .invoke(command.uid(), operation, args)
            .await?;
        if !status.changed() {
            return Ok(false);
        }

        self.inner
            .store
            .with_device_mut(&owner, |device| commit(device, &command));
        Ok(true)
    }
}

impl std::fmt::Debug for HomeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeControl")
            .field("gateway", &self.inner.gateway.id())
            .field("devices", &self.inner.store.len())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Command helpers ──────────────────────────────────────────────────

fn owner_of(command: &Command) -> &str {
    match command {
        Command::ChangeSetting { uid, .. } => setting_device_uid(uid),
        other => device_uid(other.uid()),
    }
}

fn not_found(uid: &str) -> CoreError {
    CoreError::PropertyNotFound {
        uid: uid.to_owned(),
    }
}

fn validate(device: &Device, command: &Command) -> Result<(), CoreError> {
    match command {
        Command::SetBinarySwitch { uid, .. } => {
            device.binary_switches.get(uid).ok_or_else(|| not_found(uid))?;
        }
        Command::SetMultiLevelSwitch { uid, value } => {
            device
                .multi_level_switches
                .get(uid)
                .ok_or_else(|| not_found(uid))?
                .check_range(*value)?;
        }
        Command::PressKey { uid, key } => {
            device
                .remote_controls
                .get(uid)
                .ok_or_else(|| not_found(uid))?
                .check_key(*key)?;
        }
        Command::ChangeSetting { uid, change } => {
            let setting = device.settings.get(uid).ok_or_else(|| not_found(uid))?;
            if setting.kind != change.kind() {
                return Err(CoreError::WrongElement {
                    uid: uid.clone(),
                    kind: change.kind().to_string(),
                });
            }
            change.validate()?;
        }
    }
    Ok(())
}

fn commit(device: &mut Device, command: &Command) {
    let now = chrono::Utc::now();
    match command {
        Command::SetBinarySwitch { uid, state } => {
            if let Some(switch) = device.binary_switches.get_mut(uid) {
                switch.state = *state;
                switch.touch(now);
            }
        }
        Command::SetMultiLevelSwitch { uid, value } => {
            if let Some(switch) = device.multi_level_switches.get_mut(uid) {
                switch.value = *value;
                switch.touch(now);
            }
        }
        Command::PressKey { uid, key } => {
            if let Some(remote) = device.remote_controls.get_mut(uid) {
                remote.key_pressed = *key;
                remote.touch(now);
            }
        }
        Command::ChangeSetting { uid, change } => {
            if let Some(setting) = device.settings.get_mut(uid) {
                setting.commit(change);
            }
        }
    }
}

// ── Dispatcher task ──────────────────────────────────────────────────

async fn run_dispatcher(
    mut notifications: mpsc::Receiver<PushNotification>,
    dispatcher: Dispatcher,
    inventory: Inventory,
    cancel: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = notifications.recv() => match received {
                Some(n) => n,
                None => break,
            },
        };

        match dispatcher.handle(&notification) {
            Outcome::DeviceAdded(uid) => {
                if let Err(e) = inventory.load_device(&uid).await {
                    warn!(uid, error = %e, "could not load new device");
                }
            }
            Outcome::Applied | Outcome::Ignored | Outcome::DeviceRemoved(_) => {}
        }
    }
    debug!("dispatcher stopped");
}
