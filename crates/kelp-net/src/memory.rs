//! In-process network of memory-backed storage nodes.
//!
//! [`MemoryNetwork`] answers every capability call from per-node hash maps
//! and applies tombstones the way a storage node does: once a node accepts
//! a tombstone, head and get for every member address answer `Removed`.
//!
//! Failure injection knobs: a node can be marked down (unreachable), set to
//! deny every request, set to corrupt what it returns (headers and ids no
//! longer match), or slowed down by a fixed latency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kelp_types::{
    Address, CommonParams, ContainerId, NodeId, Object, ObjectHeader, ObjectId, ObjectType,
    SearchFilter, SplitInfo, TombstoneBody,
};
use tracing::debug;

use crate::error::NetError;
use crate::{
    GetCapable, GetResponse, HeadCapable, HeadResponse, PutCapable, PutStream, SearchCapable,
};

/// Attribute added to headers returned by a corrupting node.
const TAMPER_ATTRIBUTE: &str = "__KELP__TAMPERED";

/// A request observed by a memory node, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Head { address: Address, raw: bool, ttl: u32 },
    Get { address: Address, ttl: u32 },
    Search { container: ContainerId, ttl: u32 },
    OpenPut { ttl: u32 },
}

/// One message of a put stream as received by a memory node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Header received; carries the payload length it declared.
    Init { payload_len: u64 },
    /// Payload chunk of the given size.
    Chunk(usize),
    Close,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    down: bool,
    denied: bool,
    corrupt: bool,
    latency: Duration,
}

impl Faults {
    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[derive(Default)]
struct MemoryNode {
    objects: RwLock<HashMap<Address, Object>>,
    /// Member address -> tombstone that removed it.
    removed: RwLock<HashMap<Address, Address>>,
    faults: RwLock<Faults>,
    calls: Mutex<Vec<Call>>,
    streams: Mutex<Vec<Vec<StreamEvent>>>,
}

impl MemoryNode {
    fn store(&self, object: Object) -> Result<Address, String> {
        let address = object.address().map_err(|e| e.to_string())?;

        if object.header.object_type == ObjectType::Tombstone {
            let body = TombstoneBody::decode(&object.payload).map_err(|e| e.to_string())?;
            let mut removed = self.removed.write().expect("lock poisoned");
            for member in body.members {
                removed.entry(member).or_insert(address);
            }
        } else if self
            .removed
            .read()
            .expect("lock poisoned")
            .contains_key(&address)
        {
            return Err(format!("object {address} already removed"));
        }

        self.objects
            .write()
            .expect("lock poisoned")
            .insert(address, object);
        Ok(address)
    }

    fn removed_by(&self, address: &Address) -> Option<Address> {
        self.removed
            .read()
            .expect("lock poisoned")
            .get(address)
            .copied()
    }

    /// Split structure of a virtual object as known to this node, plus the
    /// parent header if a stored part carries it.
    fn split_info(&self, address: &Address) -> Option<(SplitInfo, Option<ObjectHeader>)> {
        let objects = self.objects.read().expect("lock poisoned");
        let mut found: Option<(SplitInfo, Option<ObjectHeader>)> = None;

        for (stored, object) in objects.iter() {
            if stored.container != address.container {
                continue;
            }
            let Some(split) = object.header.split.as_ref() else {
                continue;
            };
            if split.parent != Some(address.object) {
                continue;
            }

            let (info, parent) =
                found.get_or_insert_with(|| (SplitInfo::new(split.split_id), None));
            if object.header.object_type == ObjectType::Link {
                info.link = Some(stored.object);
            } else {
                info.last_part = Some(stored.object);
            }
            if parent.is_none() {
                *parent = split.parent_header.as_deref().cloned();
            }
        }

        found
    }

    fn head(&self, address: &Address, raw: bool) -> HeadResponse {
        if let Some(tombstone) = self.removed_by(address) {
            return HeadResponse::Removed {
                tombstone: Some(tombstone),
            };
        }
        if let Some(object) = self.objects.read().expect("lock poisoned").get(address) {
            return HeadResponse::Header(object.header.clone());
        }
        match self.split_info(address) {
            Some((_, Some(parent))) if !raw => HeadResponse::Header(parent),
            Some((info, _)) => HeadResponse::Split(info),
            None => HeadResponse::NotFound,
        }
    }

    fn get(&self, address: &Address) -> GetResponse {
        if let Some(tombstone) = self.removed_by(address) {
            return GetResponse::Removed {
                tombstone: Some(tombstone),
            };
        }
        if let Some(object) = self.objects.read().expect("lock poisoned").get(address) {
            return GetResponse::Object(object.clone());
        }
        match self.split_info(address) {
            Some((info, _)) => GetResponse::Split(info),
            None => GetResponse::NotFound,
        }
    }

    fn search(&self, container: &ContainerId, filters: &[SearchFilter]) -> Vec<ObjectId> {
        let objects = self.objects.read().expect("lock poisoned");
        let removed = self.removed.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = objects
            .iter()
            .filter(|(address, _)| address.container == *container)
            .filter(|(address, _)| !removed.contains_key(address))
            .filter(|(address, object)| {
                SearchFilter::all_match(filters, &address.object, &object.header)
            })
            .map(|(address, _)| address.object)
            .collect();
        ids.sort();
        ids
    }

    fn record_event(&self, stream: usize, event: StreamEvent) {
        if let Some(events) = self.streams.lock().expect("lock poisoned").get_mut(stream) {
            events.push(event);
        }
    }
}

fn tamper(mut header: ObjectHeader) -> ObjectHeader {
    header
        .attributes
        .insert(TAMPER_ATTRIBUTE.to_string(), "1".to_string());
    header
}

// ---------------------------------------------------------------------------
// MemoryNetwork
// ---------------------------------------------------------------------------

/// In-process storage network implementing every capability trait.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<NodeId, Arc<MemoryNode>>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network with the given nodes registered.
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let network = Self::new();
        for node in nodes {
            network.add_node(node);
        }
        network
    }

    /// Register a node. Re-adding an existing node is a no-op.
    pub fn add_node(&self, node: NodeId) {
        self.nodes
            .write()
            .expect("lock poisoned")
            .entry(node)
            .or_default();
    }

    /// All registered node ids.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    fn lookup(&self, node: &NodeId) -> Option<Arc<MemoryNode>> {
        self.nodes.read().expect("lock poisoned").get(node).cloned()
    }

    fn with_faults(&self, node: &NodeId, f: impl FnOnce(&mut Faults)) {
        if let Some(state) = self.lookup(node) {
            f(&mut state.faults.write().expect("lock poisoned"));
        }
    }

    /// Mark a node unreachable (or reachable again).
    pub fn set_down(&self, node: &NodeId, down: bool) {
        self.with_faults(node, |f| f.down = down);
    }

    /// Make a node refuse every request with an access-denied error.
    pub fn set_denied(&self, node: &NodeId, denied: bool) {
        self.with_faults(node, |f| f.denied = denied);
    }

    /// Make a node return headers and ids that do not match the request.
    pub fn set_corrupt(&self, node: &NodeId, corrupt: bool) {
        self.with_faults(node, |f| f.corrupt = corrupt);
    }

    /// Delay every answer of a node by `latency`.
    pub fn set_latency(&self, node: &NodeId, latency: Duration) {
        self.with_faults(node, |f| f.latency = latency);
    }

    /// Store an object directly on a node, bypassing the put stream.
    pub fn seed(&self, node: &NodeId, object: &Object) -> Result<Address, NetError> {
        let state = self.lookup(node).ok_or(NetError::Unreachable(*node))?;
        state
            .store(object.clone())
            .map_err(|reason| NetError::Remote {
                node: *node,
                reason,
            })
    }

    /// Whether a node stores an object under `address`.
    pub fn holds(&self, node: &NodeId, address: &Address) -> bool {
        self.object(node, address).is_some()
    }

    /// Stored object under `address` on a node.
    pub fn object(&self, node: &NodeId, address: &Address) -> Option<Object> {
        self.lookup(node)?
            .objects
            .read()
            .expect("lock poisoned")
            .get(address)
            .cloned()
    }

    /// Number of objects stored on a node.
    pub fn object_count(&self, node: &NodeId) -> usize {
        self.lookup(node)
            .map_or(0, |s| s.objects.read().expect("lock poisoned").len())
    }

    /// Whether a node considers `address` removed.
    pub fn is_removed(&self, node: &NodeId, address: &Address) -> bool {
        self.tombstone_for(node, address).is_some()
    }

    /// Tombstone a node recorded for `address`.
    pub fn tombstone_for(&self, node: &NodeId, address: &Address) -> Option<Address> {
        self.lookup(node)?.removed_by(address)
    }

    /// Calls a node received, in order.
    pub fn calls(&self, node: &NodeId) -> Vec<Call> {
        self.lookup(node)
            .map(|s| s.calls.lock().expect("lock poisoned").clone())
            .unwrap_or_default()
    }

    /// Put streams a node received, one event list per stream.
    pub fn streams(&self, node: &NodeId) -> Vec<Vec<StreamEvent>> {
        self.lookup(node)
            .map(|s| s.streams.lock().expect("lock poisoned").clone())
            .unwrap_or_default()
    }

    /// Forget all recorded calls and streams.
    pub fn clear_log(&self) {
        for state in self.nodes.read().expect("lock poisoned").values() {
            state.calls.lock().expect("lock poisoned").clear();
            state.streams.lock().expect("lock poisoned").clear();
        }
    }

    /// Log the call, apply latency, then down/deny faults.
    async fn enter(&self, node: NodeId, call: Call) -> Result<(Arc<MemoryNode>, Faults), NetError> {
        let state = self.lookup(&node).ok_or(NetError::Unreachable(node))?;
        state.calls.lock().expect("lock poisoned").push(call);
        let faults = state.faults.read().expect("lock poisoned").clone();

        faults.delay().await;
        if faults.down {
            return Err(NetError::Unreachable(node));
        }
        if faults.denied {
            return Err(NetError::AccessDenied {
                node,
                reason: "request rejected by node policy".into(),
            });
        }
        Ok((state, faults))
    }
}

#[async_trait]
impl HeadCapable for MemoryNetwork {
    async fn head(
        &self,
        node: NodeId,
        address: Address,
        params: &CommonParams,
        raw: bool,
    ) -> Result<HeadResponse, NetError> {
        let call = Call::Head {
            address,
            raw,
            ttl: params.ttl,
        };
        let (state, faults) = self.enter(node, call).await?;
        let response = match state.head(&address, raw) {
            HeadResponse::Header(header) if faults.corrupt => HeadResponse::Header(tamper(header)),
            other => other,
        };
        debug!(%node, %address, raw, "memory head served");
        Ok(response)
    }
}

#[async_trait]
impl GetCapable for MemoryNetwork {
    async fn get(
        &self,
        node: NodeId,
        address: Address,
        params: &CommonParams,
    ) -> Result<GetResponse, NetError> {
        let call = Call::Get {
            address,
            ttl: params.ttl,
        };
        let (state, faults) = self.enter(node, call).await?;
        let response = match state.get(&address) {
            GetResponse::Object(mut object) if faults.corrupt => {
                object.header = tamper(object.header);
                GetResponse::Object(object)
            }
            other => other,
        };
        debug!(%node, %address, "memory get served");
        Ok(response)
    }
}

#[async_trait]
impl SearchCapable for MemoryNetwork {
    async fn search(
        &self,
        node: NodeId,
        container: ContainerId,
        filters: &[SearchFilter],
        params: &CommonParams,
    ) -> Result<Vec<ObjectId>, NetError> {
        let call = Call::Search {
            container,
            ttl: params.ttl,
        };
        let (state, _) = self.enter(node, call).await?;
        let ids = state.search(&container, filters);
        debug!(%node, %container, found = ids.len(), "memory search served");
        Ok(ids)
    }
}

#[async_trait]
impl PutCapable for MemoryNetwork {
    async fn open_put(
        &self,
        node: NodeId,
        params: &CommonParams,
    ) -> Result<Box<dyn PutStream>, NetError> {
        let (state, faults) = self.enter(node, Call::OpenPut { ttl: params.ttl }).await?;
        let stream = {
            let mut streams = state.streams.lock().expect("lock poisoned");
            streams.push(Vec::new());
            streams.len() - 1
        };
        Ok(Box::new(MemoryPutStream {
            node,
            state,
            faults,
            stream,
            header: None,
            payload: Vec::new(),
            closed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Put stream
// ---------------------------------------------------------------------------

/// Upload stream into one memory node; enforces init → chunk* → close.
struct MemoryPutStream {
    node: NodeId,
    state: Arc<MemoryNode>,
    faults: Faults,
    stream: usize,
    header: Option<ObjectHeader>,
    payload: Vec<u8>,
    closed: bool,
}

impl MemoryPutStream {
    fn out_of_order(&self, reason: &str) -> NetError {
        NetError::StreamOrder {
            node: self.node,
            reason: reason.to_string(),
        }
    }

    fn remote(&self, reason: String) -> NetError {
        NetError::Remote {
            node: self.node,
            reason,
        }
    }
}

#[async_trait]
impl PutStream for MemoryPutStream {
    async fn init(&mut self, header: &ObjectHeader) -> Result<(), NetError> {
        if self.closed {
            return Err(NetError::StreamClosed);
        }
        if self.header.is_some() {
            return Err(self.out_of_order("init sent twice"));
        }
        self.faults.delay().await;
        self.state.record_event(
            self.stream,
            StreamEvent::Init {
                payload_len: header.payload_len,
            },
        );
        self.header = Some(header.clone());
        Ok(())
    }

    async fn chunk(&mut self, data: Bytes) -> Result<(), NetError> {
        if self.closed {
            return Err(NetError::StreamClosed);
        }
        let Some(header) = self.header.as_ref() else {
            return Err(self.out_of_order("chunk before init"));
        };
        if (self.payload.len() + data.len()) as u64 > header.payload_len {
            return Err(self.remote("payload exceeds declared length".into()));
        }
        self.faults.delay().await;
        self.state
            .record_event(self.stream, StreamEvent::Chunk(data.len()));
        self.payload.extend_from_slice(&data);
        Ok(())
    }

    async fn close(&mut self) -> Result<ObjectId, NetError> {
        if self.closed {
            return Err(NetError::StreamClosed);
        }
        let Some(header) = self.header.take() else {
            return Err(self.out_of_order("close before init"));
        };
        self.closed = true;
        self.faults.delay().await;
        self.state.record_event(self.stream, StreamEvent::Close);

        let object = Object {
            header,
            payload: Bytes::from(std::mem::take(&mut self.payload)),
        };
        if !object.verify_payload() {
            return Err(self.remote("payload does not match header checksum".into()));
        }
        let address = self
            .state
            .store(object)
            .map_err(|reason| self.remote(reason))?;
        debug!(node = %self.node, %address, "memory put stored");

        if self.faults.corrupt {
            return Ok(ObjectId::from_data(TAMPER_ATTRIBUTE.as_bytes()));
        }
        Ok(address.object)
    }
}
