use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::core::storage::PersistenceGateway;
use crate::shared::error::{AppError, AppResult};
use crate::shared::types::{Script, StatePatch, UNTITLED_SCRIPT};

/// The user's script collection. Ids are unique; there is no size cap.
///
/// Mutations persist the whole collection while holding the collection
/// lock, so concurrent edits reach storage in the order they were made.
pub struct ScriptLibrary {
    scripts: Mutex<Vec<Script>>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl ScriptLibrary {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            gateway,
        }
    }

    fn lock_scripts(&self) -> MutexGuard<'_, Vec<Script>> {
        match self.scripts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("[ScriptLibrary] Mutex poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    /// Pull scripts from the gateway, dropping later entries that reuse an id
    pub fn load(&self) -> AppResult<usize> {
        let persisted = self.gateway.load()?.scripts;
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(persisted.len());
        for script in persisted {
            if seen.insert(script.id.clone()) {
                unique.push(script);
            } else {
                warn!("[ScriptLibrary] Dropping duplicate script id {}", script.id);
            }
        }
        let count = unique.len();
        *self.lock_scripts() = unique;
        debug!(count, "Loaded scripts");
        Ok(count)
    }

    fn persist(&self, scripts: &[Script]) -> AppResult<()> {
        self.gateway.save(StatePatch::scripts(scripts.to_vec()))
    }

    /// Most recently modified first
    pub fn list(&self) -> Vec<Script> {
        let mut scripts = self.lock_scripts().clone();
        scripts.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        scripts
    }

    pub fn get(&self, id: &str) -> AppResult<Script> {
        self.lock_scripts()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    pub fn create(&self, title: &str) -> AppResult<Script> {
        let script = Script::new(title);
        let mut scripts = self.lock_scripts();
        scripts.push(script.clone());
        info!(id = %script.id, "Created script");
        self.persist(&scripts)?;
        Ok(script)
    }

    /// Insert or replace by id; `lastModified` is refreshed
    pub fn save(&self, mut script: Script) -> AppResult<Script> {
        if script.id.trim().is_empty() {
            return Err(AppError::Validation("Script id must not be empty".to_string()));
        }
        if script.title.trim().is_empty() {
            script.title = UNTITLED_SCRIPT.to_string();
        }
        script.touch();

        let mut scripts = self.lock_scripts();
        match scripts.iter_mut().find(|s| s.id == script.id) {
            Some(existing) => *existing = script.clone(),
            None => scripts.push(script.clone()),
        }
        self.persist(&scripts)?;
        Ok(script)
    }

    /// Retitle an existing script. A blank title becomes the placeholder.
    pub fn rename(&self, id: &str, title: &str) -> AppResult<Script> {
        let mut scripts = self.lock_scripts();
        let script = scripts.iter_mut().find(|s| s.id == id).ok_or_else(|| not_found(id))?;
        let title = title.trim();
        script.title = if title.is_empty() { UNTITLED_SCRIPT.to_string() } else { title.to_string() };
        script.touch();
        let renamed = script.clone();
        self.persist(&scripts)?;
        Ok(renamed)
    }

    pub fn delete(&self, id: &str) -> AppResult<()> {
        let mut scripts = self.lock_scripts();
        let before = scripts.len();
        scripts.retain(|s| s.id != id);
        if scripts.len() == before {
            return Err(not_found(id));
        }
        info!(id, "Deleted script");
        self.persist(&scripts)
    }

    pub fn len(&self) -> usize {
        self.lock_scripts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(id: &str) -> AppError {
    AppError::Validation(format!("Script not found: {}", id))
}

/// Export capability. Implementations decide the output format.
pub trait ScriptExporter: Send + Sync {
    /// Write `script` into the directory `dest` and return the created file
    fn export(&self, script: &Script, dest: &Path) -> AppResult<PathBuf>;
}

/// Standalone printable HTML. Content markup is written as-is.
pub struct HtmlExporter;

impl ScriptExporter for HtmlExporter {
    fn export(&self, script: &Script, dest: &Path) -> AppResult<PathBuf> {
        std::fs::create_dir_all(dest)
            .map_err(|e| AppError::Io(format!("Failed to create export directory: {}", e)))?;

        let path = dest.join(format!("{}.html", sanitize_file_name(&script.title)));
        let title = escape_html(&script.title);
        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <style>body {{ font-family: serif; max-width: 48em; margin: 2em auto; line-height: 1.6; }}</style>\n\
             </head>\n<body>\n<h1>{title}</h1>\n{content}\n</body>\n</html>\n",
            title = title,
            content = script.content,
        );

        std::fs::write(&path, document)
            .map_err(|e| AppError::Io(format!("Failed to write export file: {}", e)))?;
        info!(path = %path.display(), "Exported script");
        Ok(path)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').to_string();
    if cleaned.is_empty() {
        "script".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::InMemoryGateway;
    use crate::shared::types::{PersistedState, TranslationDirection, TranslationHistoryItem};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Holds up the first write for a while, then writes straight through
    struct StallOnceGateway {
        inner: InMemoryGateway,
        stalled: AtomicBool,
    }

    impl PersistenceGateway for StallOnceGateway {
        fn load(&self) -> AppResult<PersistedState> {
            self.inner.load()
        }

        fn save(&self, patch: StatePatch) -> AppResult<()> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(150));
            }
            self.inner.save(patch)
        }
    }

    fn library() -> (Arc<InMemoryGateway>, ScriptLibrary) {
        let gateway = Arc::new(InMemoryGateway::new());
        (gateway.clone(), ScriptLibrary::new(gateway))
    }

    #[test]
    fn create_then_get() {
        let (gateway, lib) = library();
        let script = lib.create("Scene 1").unwrap();

        assert_eq!(lib.get(&script.id).unwrap(), script);
        assert!(script.content.is_empty());
        assert_eq!(gateway.snapshot().scripts, vec![script]);
    }

    #[test]
    fn save_round_trip_leaves_history_untouched() {
        let item = TranslationHistoryItem::new("a".into(), "b".into(), TranslationDirection::SourceToTarget);
        let gateway = Arc::new(InMemoryGateway::with_state(PersistedState {
            scripts: vec![],
            history: vec![item.clone()],
        }));
        let lib = ScriptLibrary::new(gateway.clone());

        let mut script = Script::new("Draft");
        script.content = "<p><b>INT.</b> NIGHT</p>".to_string();
        let saved = lib.save(script).unwrap();

        let state = gateway.load().unwrap();
        assert_eq!(state.scripts, vec![saved.clone()]);
        assert_eq!(state.scripts[0].content, "<p><b>INT.</b> NIGHT</p>");
        assert_eq!(state.history, vec![item]);
    }

    #[test]
    fn save_replaces_existing_id() {
        let (_, lib) = library();
        let mut script = lib.create("One").unwrap();
        script.content = "updated".into();
        lib.save(script.clone()).unwrap();

        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get(&script.id).unwrap().content, "updated");
    }

    #[test]
    fn list_orders_by_last_modified() {
        let (_, lib) = library();
        let mut old = Script::new("old");
        old.last_modified = 1;
        let mut new = Script::new("new");
        new.last_modified = 2;
        *lib.lock_scripts() = vec![old, new];

        let titles: Vec<_> = lib.list().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[test]
    fn unknown_ids_are_validation_errors() {
        let (_, lib) = library();
        assert!(matches!(lib.get("missing"), Err(AppError::Validation(_))));
        assert!(matches!(lib.delete("missing"), Err(AppError::Validation(_))));
        assert!(matches!(lib.rename("missing", "x"), Err(AppError::Validation(_))));
    }

    #[test]
    fn rename_and_delete() {
        let (gateway, lib) = library();
        let script = lib.create("Before").unwrap();

        assert_eq!(lib.rename(&script.id, "  After ").unwrap().title, "After");
        lib.delete(&script.id).unwrap();
        assert!(lib.is_empty());
        assert!(gateway.snapshot().scripts.is_empty());
    }

    #[test]
    fn delete_racing_save_leaves_storage_matching_memory() {
        let gateway = Arc::new(StallOnceGateway {
            inner: InMemoryGateway::new(),
            stalled: AtomicBool::new(false),
        });
        let lib = Arc::new(ScriptLibrary::new(gateway.clone()));
        let script = Script::new("Racing");
        let id = script.id.clone();

        let saver = {
            let lib = lib.clone();
            std::thread::spawn(move || lib.save(script))
        };
        std::thread::sleep(Duration::from_millis(50));
        lib.delete(&id).unwrap();
        saver.join().unwrap().unwrap();

        assert!(lib.is_empty());
        assert!(gateway.inner.snapshot().scripts.is_empty());
    }

    #[test]
    fn rename_blank_title_uses_placeholder() {
        let (_, lib) = library();
        let script = lib.create("Named").unwrap();
        assert_eq!(lib.rename(&script.id, "   ").unwrap().title, UNTITLED_SCRIPT);
    }

    #[test]
    fn load_drops_duplicate_ids() {
        let first = Script::new("first");
        let mut dup = Script::new("dup");
        dup.id = first.id.clone();
        let gateway = Arc::new(InMemoryGateway::with_state(PersistedState {
            scripts: vec![first.clone(), dup],
            history: vec![],
        }));
        let lib = ScriptLibrary::new(gateway);

        assert_eq!(lib.load().unwrap(), 1);
        assert_eq!(lib.get(&first.id).unwrap().title, "first");
    }

    #[test]
    fn html_export_escapes_title_and_keeps_markup() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Script::new("Act <1>: \"Dawn\"");
        script.content = "<p>राम: <i>चलो</i></p>".to_string();

        let path = HtmlExporter.export(&script, dir.path()).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();

        assert_eq!(path.file_name().unwrap(), "Act _1__ _Dawn_.html");
        assert!(html.contains("<title>Act &lt;1&gt;: &quot;Dawn&quot;</title>"));
        assert!(html.contains("<p>राम: <i>चलो</i></p>"));
    }

    #[test]
    fn sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_file_name("..."), "script");
        assert_eq!(sanitize_file_name("a/b"), "a_b");
    }
}
