//! Workout history persistence.
//!
//! Workouts are appended to a JSONL (JSON Lines) file. Every access holds a
//! lock on a sidecar `workouts.jsonl.lock` file: shared for reads, exclusive
//! for appends and for the whole read-rewrite-rename of a delete. The data
//! file itself cannot carry the lock because a delete replaces its inode.
//!
//! Saving a record whose id is already present appends a newer copy; readers
//! keep the last copy of each id.

use crate::{Error, Result, WorkoutRecord};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// File name of the workout log inside the data directory
pub const WORKOUTS_FILE: &str = "workouts.jsonl";

/// Persistent workout storage
pub trait WorkoutStore {
    fn save(&mut self, record: &WorkoutRecord) -> Result<()>;

    /// All workouts, newest first
    fn list_all(&self) -> Result<Vec<WorkoutRecord>>;

    /// Remove a workout; returns whether it existed
    fn delete_by_id(&mut self, id: Uuid) -> Result<bool>;
}

/// JSONL-backed workout store
pub struct JsonlWorkoutStore {
    path: PathBuf,
}

impl JsonlWorkoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the standard location inside `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(WORKOUTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: Uuid) -> Result<Option<WorkoutRecord>> {
        Ok(self.list_all()?.into_iter().find(|r| r.id == id))
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Open the sidecar lock file and take an exclusive lock on it.
    ///
    /// The lock is held until the returned file is unlocked or dropped.
    fn acquire_write_lock(&self) -> Result<File> {
        self.ensure_parent_dir()?;
        let lock = open_lock_file(&self.lock_path())?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Raw non-empty lines of the data file. The caller holds the lock.
    fn read_lines_locked(&self) -> Result<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Raw non-empty lines, read under a shared lock
    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lock = open_lock_file(&self.lock_path())?;
        lock.lock_shared()?;
        let lines = self.read_lines_locked();
        lock.unlock()?;
        lines
    }

    /// Replace the data file with a copy lacking `id`. The caller holds the
    /// exclusive lock.
    fn rewrite_without(&self, id: Uuid) -> Result<bool> {
        let lines = self.read_lines_locked()?;
        let (removed, kept): (Vec<String>, Vec<String>) = lines.into_iter().partition(|line| {
            serde_json::from_str::<WorkoutRecord>(line).map_or(false, |r| r.id == id)
        });

        if removed.is_empty() {
            return Ok(false);
        }

        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Storage(format!("{:?} has no parent directory", self.path)))?;
        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for line in &kept {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(true)
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

impl WorkoutStore for JsonlWorkoutStore {
    fn save(&mut self, record: &WorkoutRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let lock = self.acquire_write_lock()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        lock.unlock()?;
        tracing::debug!("Saved workout {} to {:?}", record.id, self.path);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<WorkoutRecord>> {
        let mut by_id: HashMap<Uuid, WorkoutRecord> = HashMap::new();

        for (line_num, line) in self.read_lines()?.iter().enumerate() {
            match serde_json::from_str::<WorkoutRecord>(line) {
                Ok(record) => {
                    by_id.insert(record.id, record);
                }
                Err(e) => {
                    tracing::warn!("Skipping corrupted workout at line {}: {}", line_num + 1, e);
                }
            }
        }

        let mut records: Vec<WorkoutRecord> = by_id.into_values().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        tracing::debug!("Read {} workouts", records.len());
        Ok(records)
    }

    /// Rewrites the file without `id`. Lines that fail to parse are kept.
    ///
    /// The exclusive lock spans the read, the rewrite and the rename, so no
    /// concurrent save can land in the file being replaced.
    fn delete_by_id(&mut self, id: Uuid) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let lock = self.acquire_write_lock()?;
        let removed = self.rewrite_without(id);
        lock.unlock()?;
        let removed = removed?;

        if removed {
            tracing::info!("Deleted workout {}", id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_phases, HeartRateReading, TimerSettings};

    fn record(started_at: i64) -> WorkoutRecord {
        WorkoutRecord {
            id: Uuid::new_v4(),
            started_at,
            finished_at: started_at + 2_400_000,
            duration_sec: 2400.0,
            phases: build_phases(&TimerSettings::default()).to_vec(),
            completed: true,
            intervals: vec![],
            avg_hr: Some(158.5),
            max_hr: Some(181),
            all_readings: vec![HeartRateReading {
                bpm: 158,
                timestamp: started_at + 1000,
            }],
            synced: false,
        }
    }

    #[test]
    fn test_save_and_list_newest_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());

        let older = record(1_000);
        let newer = record(5_000);
        store.save(&older).unwrap();
        store.save(&newer).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], newer);
        assert_eq!(all[1], older);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonlWorkoutStore::in_dir(&temp_dir.path().join("nested"));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_resave_keeps_latest_copy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());

        let mut workout = record(1_000);
        store.save(&workout).unwrap();
        workout.synced = true;
        store.save(&workout).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].synced);
    }

    #[test]
    fn test_corrupted_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());
        let workout = record(1_000);
        store.save(&workout).unwrap();

        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        writeln!(file, "{{\"id\": \"not-a-uuid\"").unwrap();
        writeln!(file).unwrap();
        drop(file);
        store.save(&record(2_000)).unwrap();

        assert_eq!(store.list_all().unwrap().len(), 2);
        assert_eq!(store.get(workout.id).unwrap(), Some(workout));
    }

    #[test]
    fn test_delete_by_id() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());
        let keep = record(1_000);
        let gone = record(2_000);
        store.save(&keep).unwrap();
        store.save(&gone).unwrap();
        store.save(&gone).unwrap();

        assert!(store.delete_by_id(gone.id).unwrap());
        assert!(!store.delete_by_id(gone.id).unwrap());
        assert!(store.get(gone.id).unwrap().is_none());
        assert_eq!(store.list_all().unwrap(), vec![keep]);
    }

    #[test]
    fn test_delete_preserves_unparseable_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());
        let gone = record(1_000);
        store.save(&gone).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        writeln!(file, "garbage").unwrap();
        drop(file);

        assert!(store.delete_by_id(gone.id).unwrap());
        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents, "garbage\n");
    }

    #[test]
    fn test_delete_never_drops_concurrent_saves() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(WORKOUTS_FILE);

        let saver_path = path.clone();
        let saver = std::thread::spawn(move || {
            let mut store = JsonlWorkoutStore::new(saver_path);
            (0..300)
                .map(|i| {
                    let workout = record(10_000 + i);
                    store.save(&workout).unwrap();
                    workout.id
                })
                .collect::<Vec<_>>()
        });

        let mut store = JsonlWorkoutStore::new(&path);
        for i in 0..100 {
            let victim = record(i);
            store.save(&victim).unwrap();
            assert!(store.delete_by_id(victim.id).unwrap());
        }
        let saved = saver.join().unwrap();

        let listed: std::collections::HashSet<Uuid> =
            store.list_all().unwrap().into_iter().map(|r| r.id).collect();
        let lost = saved.iter().filter(|id| !listed.contains(id)).count();
        assert_eq!(lost, 0);
        assert_eq!(listed.len(), saved.len());
    }

    #[test]
    fn test_lock_file_sits_beside_data_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonlWorkoutStore::in_dir(temp_dir.path());
        store.save(&record(1_000)).unwrap();

        assert!(temp_dir.path().join("workouts.jsonl.lock").exists());
        assert_eq!(store.list_all().unwrap().len(), 1);
    }
}
