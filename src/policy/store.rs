//! Brain persistence
//!
//! Brains are saved as a versioned JSON blob under a key that encodes the
//! format version and the network dimensions. Loading never fails: any
//! missing, unreadable, mismatched or non-finite blob is replaced by a
//! freshly initialized brain and the reason is logged.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::params::{ParamGroup, ParamSet, ACTION_SIZE, HIDDEN_SIZE, OBS_SIZE, PARAM_COUNT};

/// Version of the persisted brain format
pub const BRAIN_FORMAT_VERSION: u32 = 1;

/// Store key for brains of the current format and dimensions
pub fn storage_key() -> String {
    format!("duelBrain:v{BRAIN_FORMAT_VERSION}:{OBS_SIZE}x{HIDDEN_SIZE}x{ACTION_SIZE}")
}

/// Shared input layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreBlob {
    /// Input to hidden weights, row-major
    pub w1: Vec<f64>,
    /// Hidden bias
    pub b1: Vec<f64>,
}

/// Policy head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorBlob {
    /// Mean weights, row-major
    pub w_mean: Vec<f64>,
    /// Mean bias
    pub b_mean: Vec<f64>,
    /// Per-action log standard deviation
    pub log_std: Vec<f64>,
    /// Shoot weights
    pub w_shoot: Vec<f64>,
    /// Shoot bias
    pub b_shoot: f64,
}

/// Value head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticBlob {
    /// Value weights
    pub w_value: Vec<f64>,
    /// Value bias
    pub b_value: f64,
}

/// Serializable brain with its dimensions spelled out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainBlob {
    /// Format version
    pub version: u32,
    /// Observation width
    pub obs_size: usize,
    /// Hidden width
    pub hidden_size: usize,
    /// Continuous action count
    pub action_size: usize,
    /// Shared layer
    pub core: CoreBlob,
    /// Policy head
    pub actor: ActorBlob,
    /// Value head
    pub critic: CriticBlob,
}

impl BrainBlob {
    /// Snapshot a parameter set
    pub fn from_params(params: &ParamSet) -> Self {
        let p = params.view();
        Self {
            version: BRAIN_FORMAT_VERSION,
            obs_size: OBS_SIZE,
            hidden_size: HIDDEN_SIZE,
            action_size: ACTION_SIZE,
            core: CoreBlob { w1: p.w1.to_vec(), b1: p.b1.to_vec() },
            actor: ActorBlob {
                w_mean: p.w_mean.to_vec(),
                b_mean: p.b_mean.to_vec(),
                log_std: p.log_std.to_vec(),
                w_shoot: p.w_shoot.to_vec(),
                b_shoot: p.b_shoot,
            },
            critic: CriticBlob { w_value: p.w_value.to_vec(), b_value: p.b_value },
        }
    }

    /// Validate and convert back into a parameter set
    ///
    /// Either every group is accepted or the whole blob is rejected; a blob
    /// is never partially copied.
    pub fn into_params(self) -> Result<ParamSet> {
        ensure!(
            self.version == BRAIN_FORMAT_VERSION,
            "brain format version {} (expected {BRAIN_FORMAT_VERSION})",
            self.version
        );
        ensure!(
            (self.obs_size, self.hidden_size, self.action_size) == (OBS_SIZE, HIDDEN_SIZE, ACTION_SIZE),
            "brain dimensions {}x{}x{} (expected {OBS_SIZE}x{HIDDEN_SIZE}x{ACTION_SIZE})",
            self.obs_size,
            self.hidden_size,
            self.action_size
        );

        let groups: [(ParamGroup, Vec<f64>); 9] = [
            (ParamGroup::W1, self.core.w1),
            (ParamGroup::B1, self.core.b1),
            (ParamGroup::WMean, self.actor.w_mean),
            (ParamGroup::BMean, self.actor.b_mean),
            (ParamGroup::LogStd, self.actor.log_std),
            (ParamGroup::WShoot, self.actor.w_shoot),
            (ParamGroup::BShoot, vec![self.actor.b_shoot]),
            (ParamGroup::WValue, self.critic.w_value),
            (ParamGroup::BValue, vec![self.critic.b_value]),
        ];

        let mut values = Vec::with_capacity(PARAM_COUNT);
        for (group, data) in groups {
            if data.len() != group.len() {
                bail!("group {} has {} values (expected {})", group.name(), data.len(), group.len());
            }
            if data.iter().any(|v| !v.is_finite()) {
                bail!("group {} contains non-finite values", group.name());
            }
            values.extend(data);
        }

        ParamSet::from_vec(values).context("brain arena has the wrong length")
    }

    /// Write a compact binary snapshot
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Read a compact binary snapshot
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }
}

/// Stored payload: the blob plus when it was written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBrain {
    /// Parameters
    pub brain: BrainBlob,
    /// Wall-clock save time
    pub saved_at: DateTime<Utc>,
}

/// Minimal string key-value store
pub trait KeyValueStore: Send {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// Result of [`load_brain`]
#[derive(Debug, Clone)]
pub struct LoadedBrain {
    /// The brain to train from
    pub params: ParamSet,
    /// Save time of the stored blob, `None` when a fresh brain was built
    pub saved_at: Option<DateTime<Utc>>,
}

/// Load the stored brain or fall back to `ParamSet::initialize(seed)`
pub fn load_brain(store: &dyn KeyValueStore, seed: u64) -> LoadedBrain {
    let key = storage_key();
    let fresh = || LoadedBrain { params: ParamSet::initialize(seed), saved_at: None };

    let text = match store.get(&key) {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::info!("No stored brain under {}; starting fresh", key);
            return fresh();
        }
        Err(e) => {
            tracing::warn!("Failed to read stored brain: {:#}", e);
            return fresh();
        }
    };

    let parsed = serde_json::from_str::<SavedBrain>(&text)
        .map_err(anyhow::Error::from)
        .and_then(|saved| Ok((saved.brain.into_params()?, saved.saved_at)));

    match parsed {
        Ok((params, saved_at)) => {
            tracing::info!("Loaded brain saved at {}", saved_at);
            LoadedBrain { params, saved_at: Some(saved_at) }
        }
        Err(e) => {
            tracing::warn!("Rejected stored brain ({:#}); starting fresh", e);
            fresh()
        }
    }
}

/// Persist a brain and return the recorded timestamp
pub fn save_brain(store: &mut dyn KeyValueStore, params: &ParamSet) -> Result<DateTime<Utc>> {
    let saved = SavedBrain { brain: BrainBlob::from_params(params), saved_at: Utc::now() };
    let json = serde_json::to_string(&saved)?;
    store.set(&storage_key(), &json)?;
    Ok(saved.saved_at)
}
