/**
 * Replica Document
 *
 * The conflict-free workspace document shared by every client and by the
 * authoritative copy on the server. It wraps a `yrs::Doc` and exposes the
 * workspace model (screens and their conversation points) through typed
 * mutations, so callers never touch raw CRDT keys.
 *
 * # Layout
 *
 * Four flat root maps, each value an LWW register:
 *
 * - `screens`       - `{screen}` -> screen id (presence)
 * - `screenFields`  - `{screen}/{field}` -> position JSON, height, selectedIndex
 * - `points`        - `{screen}/{timestamp}` -> timestamp (presence)
 * - `pointFields`   - `{screen}/{timestamp}/{field}` -> prompt, html, title, arrows JSON
 *
 * Flat keys keep concurrent edits field-granular: two replicas adding points
 * to the same screen, or editing different fields of one point, never clobber
 * each other. Removal writes a `Null` tombstone instead of deleting the key,
 * so every change advances the state vector and a peer whose state vector
 * covers ours is guaranteed to have seen it.
 */

use crate::shared::error::ReplicaError;
use crate::shared::model::{Arrow, ConversationPoint, Position, ScreenEntry, WorkspaceSnapshot};
use crate::shared::origin::Origin;
use std::collections::BTreeMap;
use std::fmt;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact, TransactionMut, Update};

/// Opaque, mergeable unit of change (yrs v1 update encoding)
pub type Delta = Vec<u8>;

const SEP: char = '/';

/// v1 encoding of an update with no structs and an empty delete set
const EMPTY_UPDATE_V1: [u8; 2] = [0, 0];

const FIELD_POSITION: &str = "position";
const FIELD_HEIGHT: &str = "height";
const FIELD_SELECTED_INDEX: &str = "selectedIndex";
const FIELD_PROMPT: &str = "prompt";
const FIELD_HTML: &str = "html";
const FIELD_TITLE: &str = "title";
const FIELD_ARROWS: &str = "arrows";

const SCREEN_FIELDS: [&str; 3] = [FIELD_POSITION, FIELD_HEIGHT, FIELD_SELECTED_INDEX];
const POINT_FIELDS: [&str; 4] = [FIELD_PROMPT, FIELD_HTML, FIELD_TITLE, FIELD_ARROWS];

/// Whether a delta carries no changes
pub fn is_empty_delta(delta: &[u8]) -> bool {
    delta.is_empty() || delta == EMPTY_UPDATE_V1
}

struct Roots {
    screens: MapRef,
    screen_fields: MapRef,
    points: MapRef,
    point_fields: MapRef,
}

/// Workspace replica backed by a yrs document
pub struct ReplicaDocument {
    doc: Doc,
    roots: Roots,
}

impl fmt::Debug for ReplicaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaDocument")
            .field("client_id", &self.doc.client_id())
            .finish_non_exhaustive()
    }
}

impl Default for ReplicaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaDocument {
    /// Create an empty replica with a random origin id
    pub fn new() -> Self {
        let doc = Doc::new();
        let roots = Roots {
            screens: doc.get_or_insert_map("screens"),
            screen_fields: doc.get_or_insert_map("screenFields"),
            points: doc.get_or_insert_map("points"),
            point_fields: doc.get_or_insert_map("pointFields"),
        };
        Self { doc, roots }
    }

    /// Create a replica from a full-state delta
    pub fn from_state(state: &[u8], origin: Origin) -> Result<Self, ReplicaError> {
        let replica = Self::new();
        replica.apply_delta(state, origin)?;
        Ok(replica)
    }

    /// Run a set of mutations in one transaction
    ///
    /// Returns the delta produced by the transaction, or `None` when the
    /// mutations left the document unchanged.
    pub fn mutate<F>(&self, f: F) -> Option<Delta>
    where
        F: FnOnce(&mut WorkspaceMut<'_, '_>),
    {
        let mut txn = self.doc.transact_mut();
        {
            let mut handle = WorkspaceMut {
                txn: &mut txn,
                roots: &self.roots,
            };
            f(&mut handle);
        }
        let delta = txn.encode_update_v1();
        if is_empty_delta(&delta) {
            None
        } else {
            Some(delta)
        }
    }

    /// Merge a delta produced by another replica
    ///
    /// Merging is idempotent and commutative: duplicate or reordered deltas
    /// converge to the same content.
    pub fn apply_delta(&self, delta: &[u8], origin: Origin) -> Result<(), ReplicaError> {
        if is_empty_delta(delta) {
            return Ok(());
        }
        let update = Update::decode_v1(delta)
            .map_err(|e| ReplicaError::malformed_delta(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| ReplicaError::malformed_delta(e.to_string()))?;
        tracing::trace!("[Replica] Applied {} byte delta from {}", delta.len(), origin);
        Ok(())
    }

    /// Encoded logical clock snapshot of this replica
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// The whole document as one delta
    pub fn encode_full_state(&self) -> Delta {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Minimal delta a peer with the given state vector is missing
    ///
    /// Returns an empty delta when the peer's clocks already cover every
    /// origin this replica has seen.
    pub fn missing_for(&self, state_vector: &[u8]) -> Result<Delta, ReplicaError> {
        let remote = StateVector::decode_v1(state_vector)
            .map_err(|e| ReplicaError::malformed_state_vector(e.to_string()))?;
        let txn = self.doc.transact();
        let local = txn.state_vector();
        if covers(&remote, &local) {
            return Ok(Vec::new());
        }
        Ok(txn.encode_diff_v1(&remote))
    }

    /// Whether a replica at `state_vector` has already seen every change here
    ///
    /// An undecodable vector covers nothing.
    pub fn is_covered_by(&self, state_vector: &[u8]) -> bool {
        let Ok(remote) = StateVector::decode_v1(state_vector) else {
            return false;
        };
        let txn = self.doc.transact();
        covers(&remote, &txn.state_vector())
    }

    /// Merge several deltas into one compact delta
    pub fn merge_deltas(deltas: &[Delta]) -> Result<Delta, ReplicaError> {
        match deltas {
            [] => Ok(Vec::new()),
            [single] => Ok(single.clone()),
            many => {
                let refs: Vec<&[u8]> = many.iter().map(|d| d.as_slice()).collect();
                yrs::merge_updates_v1(refs.as_slice())
                    .map_err(|e| ReplicaError::malformed_delta(e.to_string()))
            }
        }
    }

    /// Materialize the current content
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        let txn = self.doc.transact();
        read_snapshot(&self.roots, &txn)
    }

    /// Load a durable snapshot without overwriting anything already present
    ///
    /// Screens or points the replica has tombstoned stay removed, and fields a
    /// client already wrote keep their live value.
    pub fn apply_baseline(&self, baseline: &WorkspaceSnapshot) -> Option<Delta> {
        self.mutate(|ws| {
            for screen in baseline.screens.values() {
                ws.fill_screen(screen);
            }
        })
    }
}

/// Whether `remote` has seen every clock in `local`
fn covers(remote: &StateVector, local: &StateVector) -> bool {
    local.iter().all(|(client, clock)| remote.get(client) >= *clock)
}

/// Mutation handle passed to [`ReplicaDocument::mutate`]
///
/// Setters are upserts: writing a field of a screen or point that does not
/// exist yet creates it. Writes equal to the current value are skipped so they
/// do not produce deltas.
pub struct WorkspaceMut<'a, 'doc> {
    txn: &'a mut TransactionMut<'doc>,
    roots: &'a Roots,
}

impl WorkspaceMut<'_, '_> {
    pub fn upsert_screen(&mut self, screen_id: &str) {
        let roots = self.roots;
        put_value(self.txn, &roots.screens, screen_id.to_string(), Any::from(screen_id.to_string()));
    }

    pub fn set_position(&mut self, screen_id: &str, position: Position) {
        self.upsert_screen(screen_id);
        let json = encode_json(&position);
        self.put_screen_field(screen_id, FIELD_POSITION, Any::from(json));
    }

    pub fn set_height(&mut self, screen_id: &str, height: f64) {
        self.upsert_screen(screen_id);
        self.put_screen_field(screen_id, FIELD_HEIGHT, Any::Number(height));
    }

    pub fn set_selected_index(&mut self, screen_id: &str, index: i64) {
        self.upsert_screen(screen_id);
        self.put_screen_field(screen_id, FIELD_SELECTED_INDEX, Any::BigInt(index));
    }

    /// Write every field of a screen and its points
    pub fn put_screen(&mut self, screen: &ScreenEntry) {
        self.upsert_screen(&screen.id);
        if let Some(position) = screen.position {
            self.set_position(&screen.id, position);
        }
        if let Some(height) = screen.height {
            self.set_height(&screen.id, height);
        }
        if let Some(index) = screen.selected_index {
            self.set_selected_index(&screen.id, index);
        }
        for point in &screen.conversation_points {
            self.put_conversation_point(&screen.id, point);
        }
    }

    /// Add a conversation point, or overwrite every field of an existing one
    pub fn put_conversation_point(&mut self, screen_id: &str, point: &ConversationPoint) {
        self.upsert_point(screen_id, point.timestamp);
        let ts = point.timestamp;
        self.put_point_field(screen_id, ts, FIELD_PROMPT, Any::from(point.prompt.clone()));
        self.put_point_field(screen_id, ts, FIELD_HTML, Any::from(point.html.clone()));
        self.put_point_field(screen_id, ts, FIELD_TITLE, Any::from(point.title.clone()));
        self.put_point_field(screen_id, ts, FIELD_ARROWS, Any::from(encode_json(&point.arrows)));
    }

    pub fn set_point_prompt(&mut self, screen_id: &str, timestamp: i64, prompt: &str) {
        self.upsert_point(screen_id, timestamp);
        self.put_point_field(screen_id, timestamp, FIELD_PROMPT, Any::from(prompt.to_string()));
    }

    pub fn set_point_html(&mut self, screen_id: &str, timestamp: i64, html: &str) {
        self.upsert_point(screen_id, timestamp);
        self.put_point_field(screen_id, timestamp, FIELD_HTML, Any::from(html.to_string()));
    }

    pub fn set_point_title(&mut self, screen_id: &str, timestamp: i64, title: &str) {
        self.upsert_point(screen_id, timestamp);
        self.put_point_field(screen_id, timestamp, FIELD_TITLE, Any::from(title.to_string()));
    }

    /// Replace the arrow list of a point wholesale
    pub fn set_arrows(&mut self, screen_id: &str, timestamp: i64, arrows: &[Arrow]) {
        self.upsert_point(screen_id, timestamp);
        self.put_point_field(screen_id, timestamp, FIELD_ARROWS, Any::from(encode_json(&arrows)));
    }

    pub fn remove_conversation_point(&mut self, screen_id: &str, timestamp: i64) {
        let roots = self.roots;
        clear_value(self.txn, &roots.points, &point_key(screen_id, timestamp));
        for field in POINT_FIELDS {
            clear_value(self.txn, &roots.point_fields, &point_field_key(screen_id, timestamp, field));
        }
    }

    pub fn remove_screen(&mut self, screen_id: &str) {
        let roots = self.roots;
        clear_value(self.txn, &roots.screens, screen_id);
        for field in SCREEN_FIELDS {
            clear_value(self.txn, &roots.screen_fields, &screen_field_key(screen_id, field));
        }
        let point_keys: Vec<String> = roots
            .points
            .keys(&*self.txn)
            .filter(|key| parse_point_key(key).map(|(sid, _)| sid == screen_id).unwrap_or(false))
            .map(str::to_string)
            .collect();
        for key in point_keys {
            if let Some((_, ts)) = parse_point_key(&key) {
                self.remove_conversation_point(screen_id, ts);
            }
        }
    }

    /// Current content as seen inside this transaction
    pub fn read(&self) -> WorkspaceSnapshot {
        read_snapshot(self.roots, &*self.txn)
    }

    fn fill_screen(&mut self, screen: &ScreenEntry) {
        let roots = self.roots;
        if roots.screens.get(&*self.txn, &screen.id).is_none() {
            self.put_screen(screen);
            return;
        }
        if !is_live(roots.screens.get(&*self.txn, &screen.id)) {
            return;
        }
        if let Some(position) = screen.position {
            let key = screen_field_key(&screen.id, FIELD_POSITION);
            put_if_absent(self.txn, &roots.screen_fields, key, Any::from(encode_json(&position)));
        }
        if let Some(height) = screen.height {
            let key = screen_field_key(&screen.id, FIELD_HEIGHT);
            put_if_absent(self.txn, &roots.screen_fields, key, Any::Number(height));
        }
        if let Some(index) = screen.selected_index {
            let key = screen_field_key(&screen.id, FIELD_SELECTED_INDEX);
            put_if_absent(self.txn, &roots.screen_fields, key, Any::BigInt(index));
        }
        for point in &screen.conversation_points {
            let key = point_key(&screen.id, point.timestamp);
            if roots.points.get(&*self.txn, &key).is_none() {
                self.put_conversation_point(&screen.id, point);
            }
        }
    }

    fn upsert_point(&mut self, screen_id: &str, timestamp: i64) {
        self.upsert_screen(screen_id);
        let roots = self.roots;
        put_value(self.txn, &roots.points, point_key(screen_id, timestamp), Any::BigInt(timestamp));
    }

    fn put_screen_field(&mut self, screen_id: &str, field: &str, value: Any) {
        let roots = self.roots;
        put_value(self.txn, &roots.screen_fields, screen_field_key(screen_id, field), value);
    }

    fn put_point_field(&mut self, screen_id: &str, timestamp: i64, field: &str, value: Any) {
        let roots = self.roots;
        let key = point_field_key(screen_id, timestamp, field);
        put_value(self.txn, &roots.point_fields, key, value);
    }
}

fn put_value(txn: &mut TransactionMut, map: &MapRef, key: String, value: Any) {
    let unchanged = match map.get(&*txn, &key) {
        Some(Out::Any(current)) => current == value,
        _ => false,
    };
    if !unchanged {
        map.insert(txn, key, value);
    }
}

fn put_if_absent(txn: &mut TransactionMut, map: &MapRef, key: String, value: Any) {
    if map.get(&*txn, &key).is_none() {
        map.insert(txn, key, value);
    }
}

fn clear_value(txn: &mut TransactionMut, map: &MapRef, key: &str) {
    if is_live(map.get(&*txn, key)) {
        map.insert(txn, key.to_string(), Any::Null);
    }
}

fn is_live(value: Option<Out>) -> bool {
    !matches!(value, None | Some(Out::Any(Any::Null)))
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn screen_field_key(screen_id: &str, field: &str) -> String {
    format!("{screen_id}{SEP}{field}")
}

fn point_key(screen_id: &str, timestamp: i64) -> String {
    format!("{screen_id}{SEP}{timestamp}")
}

fn point_field_key(screen_id: &str, timestamp: i64, field: &str) -> String {
    format!("{screen_id}{SEP}{timestamp}{SEP}{field}")
}

fn parse_point_key(key: &str) -> Option<(&str, i64)> {
    let (screen_id, ts) = key.rsplit_once(SEP)?;
    Some((screen_id, ts.parse().ok()?))
}

fn parse_point_field_key(key: &str) -> Option<(&str, i64, &str)> {
    let (rest, field) = key.rsplit_once(SEP)?;
    let (screen_id, ts) = parse_point_key(rest)?;
    Some((screen_id, ts, field))
}

fn as_string(value: &Out) -> Option<String> {
    match value {
        Out::Any(Any::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Out) -> Option<f64> {
    match value {
        Out::Any(Any::Number(n)) => Some(*n),
        Out::Any(Any::BigInt(n)) => Some(*n as f64),
        _ => None,
    }
}

fn as_i64(value: &Out) -> Option<i64> {
    match value {
        Out::Any(Any::BigInt(n)) => Some(*n),
        Out::Any(Any::Number(n)) => Some(*n as i64),
        _ => None,
    }
}

fn read_snapshot<T: ReadTxn>(roots: &Roots, txn: &T) -> WorkspaceSnapshot {
    let mut screens: BTreeMap<String, ScreenEntry> = BTreeMap::new();
    for (key, value) in roots.screens.iter(txn) {
        if is_live(Some(value)) {
            screens.insert(key.to_string(), ScreenEntry::new(key));
        }
    }

    for (key, value) in roots.screen_fields.iter(txn) {
        let Some((screen_id, field)) = key.rsplit_once(SEP) else { continue };
        let Some(screen) = screens.get_mut(screen_id) else { continue };
        match field {
            FIELD_POSITION => {
                screen.position = as_string(&value).and_then(|s| serde_json::from_str(&s).ok());
            }
            FIELD_HEIGHT => screen.height = as_f64(&value),
            FIELD_SELECTED_INDEX => screen.selected_index = as_i64(&value),
            _ => {}
        }
    }

    // (screen, timestamp) ordering yields points sorted by timestamp per screen
    let mut points: BTreeMap<(String, i64), ConversationPoint> = BTreeMap::new();
    for (key, value) in roots.points.iter(txn) {
        if !is_live(Some(value)) {
            continue;
        }
        if let Some((screen_id, ts)) = parse_point_key(key) {
            if screens.contains_key(screen_id) {
                points.insert((screen_id.to_string(), ts), ConversationPoint::new(ts, ""));
            }
        }
    }

    for (key, value) in roots.point_fields.iter(txn) {
        let Some((screen_id, ts, field)) = parse_point_field_key(key) else { continue };
        let Some(point) = points.get_mut(&(screen_id.to_string(), ts)) else { continue };
        match field {
            FIELD_PROMPT => point.prompt = as_string(&value).unwrap_or_default(),
            FIELD_HTML => point.html = as_string(&value).unwrap_or_default(),
            FIELD_TITLE => point.title = as_string(&value).unwrap_or_default(),
            FIELD_ARROWS => {
                point.arrows = as_string(&value)
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default();
            }
            _ => {}
        }
    }

    for ((screen_id, _), point) in points {
        if let Some(screen) = screens.get_mut(&screen_id) {
            screen.conversation_points.push(point);
        }
    }

    WorkspaceSnapshot { screens }
}
