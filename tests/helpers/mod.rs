//! In-memory backends for driving the handlers without AWS.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use auris_tools::{
    models::{
        block::{Block, BlockType, ResultPage},
        item::WireItem,
        job::{DocumentLocation, JobStatus},
    },
    services::{
        ocr::{BoxError, TextDetectionApi},
        storage::{ObjectHead, ObjectStore, StorageError},
        database::ItemStore,
    },
};

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjects {
    fn lookup(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(StorageError::Status(404))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lookup(bucket, key)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError> {
        self.lookup(bucket, key).map(|data| ObjectHead {
            content_length: data.len() as u64,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Items keyed by table and the wire form of their `id` attribute.
#[derive(Default)]
pub struct MemoryItems {
    tables: Mutex<HashMap<String, HashMap<String, WireItem>>>,
}

fn id_of(item: &WireItem) -> Result<String, BoxError> {
    let id = item.get("id").ok_or("item has no id attribute")?;
    Ok(serde_json::to_string(id)?)
}

#[async_trait]
impl ItemStore for MemoryItems {
    async fn put_item(&self, table: &str, item: WireItem) -> Result<(), BoxError> {
        let id = id_of(&item)?;
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, item);
        Ok(())
    }

    async fn get_item(&self, table: &str, key: WireItem) -> Result<Option<WireItem>, BoxError> {
        let id = id_of(&key)?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|items| items.get(&id))
            .cloned())
    }

    async fn delete_item(&self, table: &str, key: WireItem) -> Result<(), BoxError> {
        let id = id_of(&key)?;
        if let Some(items) = self.tables.lock().unwrap().get_mut(table) {
            items.remove(&id);
        }
        Ok(())
    }
}

/// Text detection that reports `InProgress` a fixed number of times, then
/// serves the scripted pages in order.
pub struct ScriptedDetection {
    pending_checks: Mutex<u32>,
    pages: Mutex<VecDeque<ResultPage>>,
    pub submitted: Mutex<Vec<DocumentLocation>>,
}

impl ScriptedDetection {
    pub fn new(pending_checks: u32, pages: Vec<ResultPage>) -> Self {
        Self {
            pending_checks: Mutex::new(pending_checks),
            pages: Mutex::new(pages.into()),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextDetectionApi for ScriptedDetection {
    async fn start_document_text_detection(
        &self,
        location: &DocumentLocation,
    ) -> Result<String, BoxError> {
        self.submitted.lock().unwrap().push(location.clone());
        Ok("job-1".to_string())
    }

    async fn get_document_text_detection(
        &self,
        _job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, BoxError> {
        if next_token.is_none() {
            let mut pending = self.pending_checks.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Ok(ResultPage {
                    job_status: JobStatus::InProgress,
                    blocks: Vec::new(),
                    next_token: None,
                });
            }
            if let Some(first) = self.pages.lock().unwrap().front() {
                return Ok(first.clone());
            }
        }

        let mut pages = self.pages.lock().unwrap();
        if next_token.is_some() {
            pages.pop_front();
        }
        pages.front().cloned().ok_or_else(|| "no more pages".into())
    }
}

pub fn page(lines: &[&str], next_token: Option<&str>) -> ResultPage {
    ResultPage {
        job_status: JobStatus::Succeeded,
        blocks: std::iter::once(Block::new(BlockType::Page, None))
            .chain(lines.iter().map(|line| Block::new(BlockType::Line, Some(line))))
            .collect(),
        next_token: next_token.map(str::to_string),
    }
}
