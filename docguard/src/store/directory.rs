use super::DocumentStore;
use crate::error::{DocGuardError, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Documents stored as files: `<root>/<database>/<collection>/**/*`.
///
/// `.yaml`/`.yml` and `.json` files hold one document, or a list of them.
/// `.md` files carry the document as YAML front matter. A single-document
/// file without `_id` gets its file stem as `_id`.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if !root.is_dir() {
            return Err(DocGuardError::Connection(format!(
                "Data directory does not exist: {}",
                root.display()
            )));
        }
        Ok(DirectoryStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, database: &str, collection: &str) -> PathBuf {
        self.root.join(database).join(collection)
    }
}

impl DocumentStore for DirectoryStore {
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Value>> {
        let base_dir = self.collection_dir(database, collection);
        if !base_dir.is_dir() {
            return Err(DocGuardError::CollectionNotFound {
                database: database.into(),
                collection: collection.into(),
            });
        }

        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&base_dir.to_string_lossy())
        );
        let mut files = Vec::new();
        for entry in glob::glob(&pattern)
            .map_err(|e| DocGuardError::Other(format!("Glob error: {e}")))?
        {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if path.is_file() && !is_hidden(&path) {
                files.push(path);
            }
        }
        files.sort();

        let mut documents = Vec::new();
        for file_path in &files {
            match read_document_file(file_path)? {
                Some(Value::Sequence(items)) => documents.extend(items),
                Some(doc) => documents.push(with_file_id(doc, file_path)),
                None => log::warn!("Skipping unrecognized file {}", file_path.display()),
            }
        }

        log::debug!(
            "Read {} documents from {}",
            documents.len(),
            base_dir.display()
        );
        Ok(documents)
    }

    fn collections(&self, database: &str) -> Result<Vec<String>> {
        let db_dir = self.root.join(database);
        if !db_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&db_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Parse one file. `None` for extensions that don't hold documents.
fn read_document_file(path: &Path) -> Result<Option<Value>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let content = match ext.as_str() {
        "yaml" | "yml" | "json" | "md" => std::fs::read_to_string(path)?,
        _ => return Ok(None),
    };

    let value = match ext.as_str() {
        "json" => serde_json::from_str(&content)?,
        "md" => parse_front_matter(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(Some(value))
}

/// Extract the YAML front matter block of a markdown document.
/// A document without front matter is an empty mapping.
fn parse_front_matter(content: &str) -> Result<Value> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return Ok(Value::Mapping(Default::default())),
    };

    let end = rest
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .find(|(_, line)| line.trim_end() == "---")
        .map(|(start, _)| start)
        .ok_or_else(|| DocGuardError::Other("Unterminated front matter".into()))?;

    let front = &rest[..end];
    if front.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    Ok(serde_yaml::from_str(front)?)
}

fn with_file_id(mut doc: Value, path: &Path) -> Value {
    if let (Some(mapping), Some(stem)) = (doc.as_mapping_mut(), path.file_stem()) {
        if !mapping.contains_key("_id") {
            mapping.insert(
                Value::String("_id".into()),
                Value::String(stem.to_string_lossy().to_string()),
            );
        }
    }
    doc
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, DirectoryStore) {
        let tmp = TempDir::new().unwrap();
        let music = tmp.path().join("site/music");
        let colls = tmp.path().join("site/music-collection");
        std::fs::create_dir_all(&music).unwrap();
        std::fs::create_dir_all(&colls).unwrap();

        std::fs::write(
            music.join("nocturne.md"),
            "---\nname: Nocturne\nslug: nocturne\ncollection: piano\n---\n\nBody text.\n",
        )
        .unwrap();
        std::fs::write(
            music.join("etude.yaml"),
            "_id: e1\nname: Etude\nslug: etude\ncollection: piano\n",
        )
        .unwrap();
        std::fs::write(music.join(".gitkeep"), "").unwrap();
        std::fs::write(music.join("notes.txt"), "not a document").unwrap();
        std::fs::write(
            colls.join("all.json"),
            r#"[{"collectionslug": "piano"}, {"collectionslug": "strings"}]"#,
        )
        .unwrap();

        let store = DirectoryStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_fetch_all_reads_every_format() {
        let (_tmp, store) = setup_store();
        let docs = store.fetch_all("site", "music").unwrap();
        assert_eq!(docs.len(), 2);

        // sorted by path: etude.yaml before nocturne.md
        assert_eq!(docs[0]["_id"], Value::String("e1".into()));
        assert_eq!(docs[1]["_id"], Value::String("nocturne".into()));
        assert_eq!(docs[1]["name"], Value::String("Nocturne".into()));
    }

    #[test]
    fn test_list_file_expands() {
        let (_tmp, store) = setup_store();
        let docs = store.fetch_all("site", "music-collection").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].get("_id").is_none());
    }

    #[test]
    fn test_missing_collection() {
        let (_tmp, store) = setup_store();
        let err = store.fetch_all("site", "nope").unwrap_err();
        assert!(matches!(err, DocGuardError::CollectionNotFound { .. }));
    }

    #[test]
    fn test_collections_listing() {
        let (_tmp, store) = setup_store();
        assert_eq!(
            store.collections("site").unwrap(),
            vec!["music".to_string(), "music-collection".to_string()]
        );
        assert!(store.collections("other").unwrap().is_empty());
    }

    #[test]
    fn test_front_matter_parsing() {
        let doc = parse_front_matter("---\na: 1\n---\nbody").unwrap();
        assert_eq!(doc["a"], Value::Number(1.into()));

        let empty = parse_front_matter("# Just a heading\n").unwrap();
        assert!(empty.as_mapping().unwrap().is_empty());

        assert!(parse_front_matter("---\na: 1\nno end\n").is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let (tmp, store) = setup_store();
        std::fs::write(tmp.path().join("site/music/broken.json"), "{ nope").unwrap();
        assert!(store.fetch_all("site", "music").is_err());
    }

    #[test]
    fn test_glob_metacharacters_in_names() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("data[*]");
        let live = root.join("site/live[2024]");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join("set.yaml"), "slug: opener\n").unwrap();

        let store = DirectoryStore::open(&root).unwrap();
        let docs = store.fetch_all("site", "live[2024]").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], Value::String("set".into()));
    }
}
