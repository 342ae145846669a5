//! # Write-Ahead Log Store
//!
//! Crash-safe [`PlayerStore`]: every change set is appended to a log file as
//! one transaction and fsynced before the in-memory state changes.
//!
//! On open the log is replayed:
//! - committed transactions are applied in order
//! - an unfinished transaction at the tail is discarded
//! - a torn or corrupt tail is cut off at the last commit
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "SWAL"]
//! [4 bytes: version]
//! [8 bytes: base LSN]
//!
//! Record:
//! [8 bytes: LSN]
//! [1 byte: record type (BEGIN/OP/COMMIT)]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of the above]
//! ```
//!
//! A BEGIN payload is the player id, each OP payload is one encoded
//! [`StateChange`], COMMIT is empty. All integers are little-endian.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::catalog::{CurrencyKind, ItemCategory, Rarity};
use crate::error::{GachaError, GachaResult};
use crate::inventory::InventoryEntry;
use crate::player::{DrawHistoryRecord, PityState, PlayerRecord, Wallet};
use crate::store::{ChangeSet, PlayerStore, PlayerSummary, StateChange, StoreState};

/// Magic bytes identifying a log file.
const WAL_MAGIC: &[u8; 4] = b"SWAL";

/// Current format version.
const WAL_VERSION: u32 = 1;

const HEADER_LEN: u64 = 16;

/// LSN + type + length before the payload.
const RECORD_PREFIX: usize = 13;

/// Log record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    Begin = 1,
    Operation = 2,
    Commit = 3,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

// ============================================================================
// PAYLOAD CODEC
// ============================================================================

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_time(buf: &mut Vec<u8>, t: DateTime<Utc>) {
    put_i64(buf, t.timestamp());
    put_u32(buf, t.timestamp_subsec_nanos());
}

const fn currency_tag(kind: CurrencyKind) -> u8 {
    match kind {
        CurrencyKind::Standard => 0,
        CurrencyKind::Special => 1,
        CurrencyKind::Credits => 2,
    }
}

const fn category_tag(category: ItemCategory) -> u8 {
    match category {
        ItemCategory::Character => 0,
        ItemCategory::LightCone => 1,
    }
}

fn put_wallet(buf: &mut Vec<u8>, wallet: &Wallet) {
    for kind in CurrencyKind::ALL {
        put_u64(buf, wallet.get(kind));
    }
}

fn put_pity(buf: &mut Vec<u8>, pity: &PityState) {
    put_u32(buf, pity.pity4);
    put_u32(buf, pity.pity5);
    buf.push(u8::from(pity.last_top_was_featured));
    put_str(buf, &pity.active_banner);
}

fn encode_change(change: &StateChange) -> Vec<u8> {
    let mut buf = Vec::new();
    match change {
        StateChange::Register { name, wallet, pity } => {
            buf.push(1);
            put_str(&mut buf, name);
            put_wallet(&mut buf, wallet);
            put_pity(&mut buf, pity);
        }
        StateChange::AdjustCurrency { kind, delta } => {
            buf.push(2);
            buf.push(currency_tag(*kind));
            put_i64(&mut buf, *delta);
        }
        StateChange::PutItem { item_id, entry } => {
            buf.push(3);
            put_str(&mut buf, item_id);
            buf.push(category_tag(entry.category));
            put_u32(&mut buf, entry.copies);
            put_time(&mut buf, entry.obtained_at);
        }
        StateChange::SetPity(pity) => {
            buf.push(4);
            put_pity(&mut buf, pity);
        }
        StateChange::AppendHistory(row) => {
            buf.push(5);
            put_str(&mut buf, &row.player_id);
            put_str(&mut buf, &row.banner_id);
            buf.push(row.rarity.stars());
            put_str(&mut buf, &row.item_id);
            buf.push(category_tag(row.category));
            put_time(&mut buf, row.timestamp);
        }
        StateChange::SetDailyClaim(at) => {
            buf.push(6);
            put_time(&mut buf, *at);
        }
    }
    buf
}

/// Bounds-checked reader over a payload.
struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() < n {
            return None;
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn i64(&mut self) -> Option<i64> {
        Some(i64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn bool(&mut self) -> Option<bool> {
        match self.u8()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    fn string(&mut self) -> Option<String> {
        let len = self.u32()? as usize;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }

    fn time(&mut self) -> Option<DateTime<Utc>> {
        let secs = self.i64()?;
        let nanos = self.u32()?;
        DateTime::from_timestamp(secs, nanos)
    }

    fn currency(&mut self) -> Option<CurrencyKind> {
        CurrencyKind::ALL.get(usize::from(self.u8()?)).copied()
    }

    fn category(&mut self) -> Option<ItemCategory> {
        match self.u8()? {
            0 => Some(ItemCategory::Character),
            1 => Some(ItemCategory::LightCone),
            _ => None,
        }
    }

    fn rarity(&mut self) -> Option<Rarity> {
        Rarity::from_stars(self.u8()?)
    }

    fn wallet(&mut self) -> Option<Wallet> {
        Some(Wallet::new(self.u64()?, self.u64()?, self.u64()?))
    }

    fn pity(&mut self) -> Option<PityState> {
        Some(PityState {
            pity4: self.u32()?,
            pity5: self.u32()?,
            last_top_was_featured: self.bool()?,
            active_banner: self.string()?,
        })
    }
}

fn decode_change(data: &[u8]) -> Option<StateChange> {
    let mut d = Decoder { data };
    let change = match d.u8()? {
        1 => StateChange::Register {
            name: d.string()?,
            wallet: d.wallet()?,
            pity: d.pity()?,
        },
        2 => StateChange::AdjustCurrency {
            kind: d.currency()?,
            delta: d.i64()?,
        },
        3 => StateChange::PutItem {
            item_id: d.string()?,
            entry: InventoryEntry {
                category: d.category()?,
                copies: d.u32()?,
                obtained_at: d.time()?,
            },
        },
        4 => StateChange::SetPity(d.pity()?),
        5 => StateChange::AppendHistory(DrawHistoryRecord {
            player_id: d.string()?,
            banner_id: d.string()?,
            rarity: d.rarity()?,
            item_id: d.string()?,
            category: d.category()?,
            timestamp: d.time()?,
        }),
        6 => StateChange::SetDailyClaim(d.time()?),
        _ => return None,
    };
    // Trailing bytes mean the record is not what we wrote.
    d.data.is_empty().then_some(change)
}

// ============================================================================
// LOG FILE
// ============================================================================

/// A record read back from disk.
struct WalRecord<'a> {
    lsn: u64,
    record_type: RecordType,
    payload: &'a [u8],
}

/// Parses one record, returning it with its encoded size. `None` on a torn
/// or corrupt record.
fn parse_record(data: &[u8]) -> Option<(WalRecord<'_>, usize)> {
    let prefix = data.get(..RECORD_PREFIX)?;
    let lsn = u64::from_le_bytes(prefix[0..8].try_into().ok()?);
    let record_type = RecordType::from_u8(prefix[8])?;
    let len = u32::from_le_bytes(prefix[9..13].try_into().ok()?) as usize;

    let body_end = RECORD_PREFIX.checked_add(len)?;
    let total = body_end.checked_add(4)?;
    let body = data.get(..body_end)?;
    let stored_crc = u32::from_le_bytes(data.get(body_end..total)?.try_into().ok()?);
    if crc32fast::hash(body) != stored_crc {
        return None;
    }

    Some((
        WalRecord {
            lsn,
            record_type,
            payload: &body[RECORD_PREFIX..],
        },
        total,
    ))
}

/// What replaying a log produced.
struct Recovery {
    committed: Vec<ChangeSet>,
    next_lsn: u64,
    /// Offset just past the last COMMIT.
    valid_end: u64,
    discarded: usize,
    corrupt_tail: bool,
}

fn recover(bytes: &[u8]) -> GachaResult<Recovery> {
    let invalid = |msg: &str| GachaError::InvalidConfig(format!("wal: {msg}"));

    if bytes.len() < HEADER_LEN as usize {
        return Err(invalid("truncated header"));
    }
    if &bytes[0..4] != WAL_MAGIC {
        return Err(invalid("bad magic"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != WAL_VERSION {
        return Err(invalid(&format!("unsupported version {version}")));
    }
    let mut lsn_bytes = [0u8; 8];
    lsn_bytes.copy_from_slice(&bytes[8..16]);

    struct OpenTxn {
        player_id: Option<String>,
        changes: Vec<StateChange>,
        corrupt: bool,
    }

    let mut recovery = Recovery {
        committed: Vec::new(),
        next_lsn: u64::from_le_bytes(lsn_bytes),
        valid_end: HEADER_LEN,
        discarded: 0,
        corrupt_tail: false,
    };
    let mut open: Option<OpenTxn> = None;
    let mut pos = HEADER_LEN as usize;

    while pos < bytes.len() {
        let Some((record, size)) = parse_record(&bytes[pos..]) else {
            recovery.corrupt_tail = true;
            break;
        };
        pos += size;
        recovery.next_lsn = recovery.next_lsn.max(record.lsn.saturating_add(1));

        match record.record_type {
            RecordType::Begin => {
                if open.is_some() {
                    recovery.discarded += 1;
                }
                let player_id = String::from_utf8(record.payload.to_vec()).ok();
                let corrupt = player_id.is_none();
                open = Some(OpenTxn {
                    player_id,
                    changes: Vec::new(),
                    corrupt,
                });
            }
            RecordType::Operation => match open.as_mut() {
                Some(txn) => match decode_change(record.payload) {
                    Some(change) => txn.changes.push(change),
                    None => txn.corrupt = true,
                },
                None => tracing::warn!(lsn = record.lsn, "wal operation outside a transaction"),
            },
            RecordType::Commit => {
                match open.take() {
                    Some(OpenTxn {
                        player_id: Some(player_id),
                        changes,
                        corrupt: false,
                    }) => recovery.committed.push(ChangeSet { player_id, changes }),
                    Some(_) => {
                        tracing::warn!(lsn = record.lsn, "discarding undecodable transaction");
                        recovery.discarded += 1;
                    }
                    None => tracing::warn!(lsn = record.lsn, "wal commit without begin"),
                }
                recovery.valid_end = pos as u64;
            }
        }
    }

    if open.is_some() {
        recovery.discarded += 1;
    }
    Ok(recovery)
}

fn io_err(context: &str, e: &io::Error) -> GachaError {
    GachaError::unavailable(format!("wal {context}: {e}"))
}

/// Append-only transaction log.
struct WriteAheadLog {
    path: PathBuf,
    next_lsn: u64,
    file: BufWriter<File>,
    /// Bytes written, including buffered ones.
    position: u64,
    /// Offset just past the last COMMIT.
    valid_end: u64,
}

impl WriteAheadLog {
    /// Opens or creates a log, returning it with the committed change sets.
    fn open(path: &Path) -> GachaResult<(Self, Vec<ChangeSet>)> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_err("open", &e))?;
        let len = file.metadata().map_err(|e| io_err("metadata", &e))?.len();
        if len == 0 {
            write_header(&mut file, 0).map_err(|e| io_err("header", &e))?;
        }

        let bytes = fs::read(path).map_err(|e| io_err("read", &e))?;
        let recovery = recover(&bytes)?;

        if recovery.corrupt_tail {
            tracing::warn!(path = %path.display(), "wal tail is corrupt, truncating to last commit");
        }
        if recovery.discarded > 0 {
            tracing::warn!(
                path = %path.display(),
                discarded = recovery.discarded,
                "uncommitted wal transactions rolled back"
            );
        }
        if recovery.valid_end < bytes.len() as u64 {
            file.set_len(recovery.valid_end).map_err(|e| io_err("truncate", &e))?;
            file.sync_all().map_err(|e| io_err("sync", &e))?;
        }

        let wal = Self {
            path: path.to_path_buf(),
            next_lsn: recovery.next_lsn,
            file: BufWriter::new(file),
            position: recovery.valid_end,
            valid_end: recovery.valid_end,
        };
        Ok((wal, recovery.committed))
    }

    fn begin_transaction(&mut self, player_id: &str) -> io::Result<Transaction<'_>> {
        let txn_id = self.write_record(RecordType::Begin, player_id.as_bytes())?;
        Ok(Transaction {
            wal: self,
            txn_id,
            finalized: false,
        })
    }

    fn write_record(&mut self, record_type: RecordType, payload: &[u8]) -> io::Result<u64> {
        let lsn = self.next_lsn;
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "wal payload too large"))?;

        let mut record = Vec::with_capacity(RECORD_PREFIX + payload.len() + 4);
        record.extend_from_slice(&lsn.to_le_bytes());
        record.push(record_type as u8);
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&record)?;
        self.next_lsn += 1;
        self.position += record.len() as u64;
        Ok(lsn)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()
    }

    /// Drops everything written since the last COMMIT.
    fn discard_tail(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.file, BufWriter::new(file));
        // into_parts does not flush, so buffered bytes of the failed
        // transaction never reach the file.
        drop(stale.into_parts());
        self.file.get_ref().set_len(self.valid_end)?;
        self.position = self.valid_end;
        Ok(())
    }

    /// Appends one change set as a committed transaction.
    fn append(&mut self, set: &ChangeSet) -> io::Result<u64> {
        let mut txn = self.begin_transaction(&set.player_id)?;
        for change in &set.changes {
            txn.add_operation(change)?;
        }
        txn.commit()
    }

    /// Rewrites the log as one transaction per player set.
    fn compact(&mut self, sets: &[ChangeSet]) -> io::Result<()> {
        let tmp = self.path.with_extension("compact");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        write_header(&mut file, self.next_lsn)?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&tmp)?;
        let mut fresh = Self {
            path: tmp.clone(),
            next_lsn: self.next_lsn,
            file: BufWriter::new(file),
            position: HEADER_LEN,
            valid_end: HEADER_LEN,
        };
        for set in sets {
            fresh.append(set)?;
        }
        fresh.sync()?;

        fs::rename(&tmp, &self.path)?;
        fresh.path = self.path.clone();
        *self = fresh;
        Ok(())
    }
}

fn write_header(file: &mut File, base_lsn: u64) -> io::Result<()> {
    file.write_all(WAL_MAGIC)?;
    file.write_all(&WAL_VERSION.to_le_bytes())?;
    file.write_all(&base_lsn.to_le_bytes())?;
    file.sync_all()
}

/// An open log transaction. Dropping it unfinished discards its records.
struct Transaction<'a> {
    wal: &'a mut WriteAheadLog,
    txn_id: u64,
    finalized: bool,
}

impl Transaction<'_> {
    fn add_operation(&mut self, change: &StateChange) -> io::Result<()> {
        self.wal.write_record(RecordType::Operation, &encode_change(change))?;
        Ok(())
    }

    /// Writes COMMIT and syncs. Data is durable once this returns.
    fn commit(mut self) -> io::Result<u64> {
        self.wal.write_record(RecordType::Commit, &[])?;
        self.wal.sync()?;
        self.wal.valid_end = self.wal.position;
        self.finalized = true;
        Ok(self.txn_id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            if let Err(e) = self.wal.discard_tail() {
                tracing::error!(txn = self.txn_id, error = %e, "failed to discard aborted wal transaction");
            }
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Durable store: in-memory state plus a write-ahead log.
pub struct WalStore {
    state: RwLock<StoreState>,
    log: Mutex<WriteAheadLog>,
}

impl WalStore {
    /// Opens or creates the log at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the file cannot be opened or read, and
    /// `InvalidConfig` if its header is not a log of this format.
    pub fn open(path: impl AsRef<Path>) -> GachaResult<Self> {
        let path = path.as_ref();
        let (log, committed) = WriteAheadLog::open(path)?;

        let mut state = StoreState::default();
        let replayed = committed.len();
        for set in committed {
            if let Err(e) = state.apply(&set) {
                tracing::warn!(player = %set.player_id, error = %e, "skipping unreplayable wal transaction");
            }
        }
        tracing::info!(
            path = %path.display(),
            transactions = replayed,
            players = state.player_count(),
            "wal store opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            log: Mutex::new(log),
        })
    }

    /// Compacts the log to one transaction per player.
    ///
    /// # Errors
    ///
    /// Returns `StoreCommitFailed` if the compacted log cannot be written. The
    /// existing log stays in place in that case.
    pub fn checkpoint(&self) -> GachaResult<()> {
        let mut log = self.log.lock();
        let sets = self.state.read().rebuild_sets();
        log.compact(&sets).map_err(|e| {
            tracing::error!(error = %e, "wal checkpoint failed");
            GachaError::commit_failed(e)
        })?;
        tracing::info!(players = sets.len(), "wal checkpoint complete");
        Ok(())
    }

    /// Copy of the in-memory state.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }
}

impl PlayerStore for WalStore {
    fn load(&self, player_id: &str) -> GachaResult<Option<PlayerRecord>> {
        Ok(self.state.read().load(player_id))
    }

    fn commit(&self, changes: ChangeSet) -> GachaResult<()> {
        // The log mutex serializes commits, so the staged copy cannot go
        // stale before it is installed.
        let mut log = self.log.lock();
        let staged = self.state.read().stage(&changes)?;
        log.append(&changes).map_err(|e| {
            tracing::error!(player = %changes.player_id, error = %e, "wal append failed");
            GachaError::commit_failed(e)
        })?;
        self.state.write().install(staged);
        Ok(())
    }

    fn history(&self, player_id: &str, limit: usize) -> GachaResult<Vec<DrawHistoryRecord>> {
        self.state.read().history(player_id, limit)
    }

    fn summaries(&self) -> GachaResult<Vec<PlayerSummary>> {
        Ok(self.state.read().summaries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wal_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("stellar_wal_unit_{id}.wal"))
    }

    fn register(id: &str) -> ChangeSet {
        let mut set = ChangeSet::new(id);
        set.push(StateChange::Register {
            name: "Trailblazer".into(),
            wallet: Wallet::new(10, 0, 1000),
            pity: PityState::new("stellar_warp", true),
        });
        set
    }

    fn grant(id: &str, delta: i64) -> ChangeSet {
        let mut set = ChangeSet::new(id);
        set.push(StateChange::AdjustCurrency {
            kind: CurrencyKind::Special,
            delta,
        });
        set
    }

    #[test]
    fn test_change_codec() {
        let changes = [
            StateChange::Register {
                name: "Стелла ✨".into(),
                wallet: Wallet::new(1, 2, 3),
                pity: PityState::new("butterfly_on_swordtip", false),
            },
            StateChange::AdjustCurrency { kind: CurrencyKind::Credits, delta: -42 },
            StateChange::PutItem {
                item_id: "seele".into(),
                entry: InventoryEntry {
                    category: ItemCategory::Character,
                    copies: 7,
                    obtained_at: Utc::now(),
                },
            },
            StateChange::AppendHistory(DrawHistoryRecord {
                player_id: "p1".into(),
                banner_id: "stellar_warp".into(),
                rarity: Rarity::Four,
                item_id: "asta".into(),
                category: ItemCategory::Character,
                timestamp: Utc::now(),
            }),
            StateChange::SetDailyClaim(Utc::now()),
        ];
        for change in changes {
            let bytes = encode_change(&change);
            assert_eq!(decode_change(&bytes), Some(change));
            assert_eq!(decode_change(&bytes[..bytes.len() - 1]), None);
        }
    }

    #[test]
    fn test_reopen_replays_commits() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();
            store.commit(grant("p1", 7)).unwrap();
        }
        {
            let store = WalStore::open(&path).unwrap();
            let rec = store.load("p1").unwrap().unwrap();
            assert_eq!(rec.wallet.special, 7);
            store.commit(grant("p1", 1)).unwrap();
        }
        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 8);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejected_set_is_not_logged() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();
            assert!(store.commit(grant("p1", -1)).is_err());
        }
        let len_after = fs::metadata(&path).unwrap().len();
        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), len_after);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_uncommitted_tail_is_rolled_back() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();

            let mut log = store.log.lock();
            let mut txn = log.begin_transaction("p1").unwrap();
            txn.add_operation(&StateChange::AdjustCurrency {
                kind: CurrencyKind::Special,
                delta: 99,
            })
            .unwrap();
            // Simulate a crash: flush the half transaction and skip Drop.
            txn.wal.file.flush().unwrap();
            std::mem::forget(txn);
        }
        let committed_len;
        {
            let store = WalStore::open(&path).unwrap();
            assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 0);
            committed_len = fs::metadata(&path).unwrap().len();
            store.commit(grant("p1", 3)).unwrap();
        }
        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 3);
        assert!(fs::metadata(&path).unwrap().len() > committed_len);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_tail_is_truncated() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();
            store.commit(grant("p1", 4)).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap();
        }
        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 4);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_flipped_byte_drops_that_commit_onwards() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();
        }
        let first_len = fs::metadata(&path).unwrap().len() as usize;
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(grant("p1", 5)).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes[first_len + 20] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 0);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let path = temp_wal_path();
        fs::write(&path, b"NOPE\x01\0\0\0\0\0\0\0\0\0\0\0").unwrap();
        assert!(matches!(WalStore::open(&path), Err(GachaError::InvalidConfig(_))));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let path = temp_wal_path().with_extension("d").join("players.wal");
        let err = WalStore::open(&path).err().unwrap();
        assert!(matches!(err, GachaError::StoreUnavailable { ref reason } if reason.contains("open")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_checkpoint_compacts_and_preserves_state() {
        let path = temp_wal_path();
        {
            let store = WalStore::open(&path).unwrap();
            store.commit(register("p1")).unwrap();
            store.commit(register("p2")).unwrap();
            for _ in 0..50 {
                store.commit(grant("p1", 1)).unwrap();
            }
            let before_len = fs::metadata(&path).unwrap().len();
            let before = store.snapshot();

            store.checkpoint().unwrap();
            assert!(fs::metadata(&path).unwrap().len() < before_len);
            assert_eq!(store.snapshot(), before);

            store.commit(grant("p2", 2)).unwrap();
        }
        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.load("p1").unwrap().unwrap().wallet.special, 50);
        assert_eq!(store.load("p2").unwrap().unwrap().wallet.special, 2);
        fs::remove_file(&path).ok();
    }
}
