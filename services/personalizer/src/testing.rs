use crate::decoder::RawRecord;
use crate::filter::{Eligibility, EligibleRecord, EventFilter};
use crate::generator::{GenerationParams, ServiceError, TextGenerator};
use crate::persistence::{PersistedPersonalization, PersistenceError, PersonalizationStore};
use crate::source::{FetchError, ObjectSource};
use apache_avro::types::{Record, Value as AvroValue};
use apache_avro::{Schema, Writer};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const EVENT_SCHEMA: &str = r#"{
    "type": "record",
    "name": "CustomEvent",
    "namespace": "com.braze.currents",
    "fields": [
        { "name": "id", "type": "string" },
        { "name": "user_id", "type": ["null", "string"], "default": null },
        { "name": "name", "type": "string" },
        { "name": "time", "type": "long" },
        { "name": "properties", "type": "string" }
    ]
}"#;

/// One event row for an Avro fixture
pub struct TestEvent {
    name: String,
    user_id: Option<String>,
    properties: String,
}

pub fn event(name: &str, user_id: Option<&str>, properties: &str) -> TestEvent {
    TestEvent {
        name: name.to_string(),
        user_id: user_id.map(String::from),
        properties: properties.to_string(),
    }
}

/// Encode events as an Avro object container
pub fn avro_container(events: &[TestEvent]) -> Vec<u8> {
    let schema = Schema::parse_str(EVENT_SCHEMA).unwrap();
    let mut writer = Writer::new(&schema, Vec::new());

    for (i, event) in events.iter().enumerate() {
        let mut record = Record::new(writer.schema()).unwrap();
        record.put("id", format!("evt-{i}"));
        record.put(
            "user_id",
            match &event.user_id {
                Some(id) => AvroValue::Union(1, Box::new(AvroValue::String(id.clone()))),
                None => AvroValue::Union(0, Box::new(AvroValue::Null)),
            },
        );
        record.put("name", event.name.clone());
        record.put("time", 1_705_314_645_i64 + i as i64);
        record.put("properties", event.properties.clone());
        writer.append(record).unwrap();
    }

    writer.into_inner().unwrap()
}

/// Build an eligible record through the filter
pub fn eligible(user_id: &str, properties: Value) -> EligibleRecord {
    let record = RawRecord {
        name: "view_content".to_string(),
        user_id: Some(user_id.to_string()),
        properties,
        extra: Map::new(),
    };

    match EventFilter::new("view_content").classify(record) {
        Eligibility::Eligible(record) => record,
        other => panic!("fixture is not eligible: {:?}", other),
    }
}

/// Serves fixed bytes, or fails every fetch
pub enum FakeSource {
    Bytes(Vec<u8>),
    Unreachable,
}

#[async_trait]
impl ObjectSource for FakeSource {
    async fn fetch(&self, container_id: &str, object_key: &str) -> Result<Vec<u8>, FetchError> {
        match self {
            FakeSource::Bytes(bytes) => Ok(bytes.clone()),
            FakeSource::Unreachable => Err(FetchError::Request {
                bucket: container_id.to_string(),
                key: object_key.to_string(),
                message: "NoSuchKey".to_string(),
            }),
        }
    }
}

/// Returns the same completion for every prompt, or fails for chosen users
pub struct ScriptedGenerator {
    completion: String,
    failing_users: HashSet<String>,
}

impl ScriptedGenerator {
    pub fn replying(completion: &str) -> Self {
        Self {
            completion: completion.to_string(),
            failing_users: HashSet::new(),
        }
    }

    /// Fail calls whose prompt mentions `"user":"<user_id>"`
    pub fn failing_for(mut self, user_id: &str) -> Self {
        self.failing_users.insert(user_id.to_string());
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn invoke(&self, prompt: &str, _: &GenerationParams) -> Result<String, ServiceError> {
        let fails = self
            .failing_users
            .iter()
            .any(|user| prompt.contains(&format!(r#""user":"{user}""#)));

        if fails {
            return Err(ServiceError::Request("ThrottlingException".to_string()));
        }

        Ok(self.completion.clone())
    }
}

/// Upserting in-memory table keyed by `user_id`
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, PersistedPersonalization>>,
    rejected_users: HashSet<String>,
}

impl MemoryStore {
    pub fn rejecting(user_id: &str) -> Self {
        Self {
            rows: Mutex::default(),
            rejected_users: HashSet::from([user_id.to_string()]),
        }
    }

    pub fn rows(&self) -> HashMap<String, PersistedPersonalization> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersonalizationStore for MemoryStore {
    async fn put(&self, item: &PersistedPersonalization) -> Result<(), PersistenceError> {
        if self.rejected_users.contains(&item.user_id) {
            return Err(PersistenceError::Store("AccessDeniedException".to_string()));
        }

        self.rows
            .lock()
            .unwrap()
            .insert(item.user_id.clone(), item.clone());
        Ok(())
    }
}
