use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `[kind, attrs]` pair, matching the wire shape of the remote store's
/// node metadata exactly so that it round-trips through JSON untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo(pub String, pub Value);

impl NodeInfo {
    pub fn is_dir(&self) -> bool {
        self.0 == "dirnode"
    }

    pub fn is_file(&self) -> bool {
        self.0 == "filenode"
    }

    pub fn children(&self) -> Option<&serde_json::Map<String, Value>> {
        self.1.get("children").and_then(Value::as_object)
    }

    pub fn size(&self) -> Option<u64> {
        self.1.get("size").and_then(Value::as_u64)
    }

    pub fn ro_uri(&self) -> Option<&str> {
        self.1.get("ro_uri").and_then(Value::as_str)
    }
}

/// Child directory entries are themselves `[kind, attrs]` pairs embedded in
/// the parent's `children` map; these helpers read that shape without
/// requiring a full `NodeInfo` for each child.
pub fn entry_kind(entry: &Value) -> Option<&str> {
    entry.get(0)?.as_str()
}

pub fn entry_attrs(entry: &Value) -> Option<&Value> {
    entry.get(1)
}

pub fn entry_linkcrtime(entry: &Value) -> Option<&Value> {
    entry_attrs(entry)?.get("metadata")?.get("tahoe")?.get("linkcrtime")
}

pub fn entry_size(entry: &Value) -> Option<&Value> {
    entry_attrs(entry)?.get("size")
}
