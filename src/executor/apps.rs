use std::collections::HashMap;

const BUILTIN_APPS: &[(&str, &str)] = &[
    ("settings", "com.android.settings"),
    ("camera", "com.android.camera2"),
    ("chrome", "com.android.chrome"),
    ("browser", "com.android.chrome"),
    ("maps", "com.google.android.apps.maps"),
    ("google maps", "com.google.android.apps.maps"),
    ("gmail", "com.google.android.gm"),
    ("mail", "com.google.android.gm"),
    ("email", "com.google.android.gm"),
    ("youtube", "com.google.android.youtube"),
    ("photos", "com.google.android.apps.photos"),
    ("gallery", "com.google.android.apps.photos"),
    ("phone", "com.google.android.dialer"),
    ("dialer", "com.google.android.dialer"),
    ("contacts", "com.google.android.contacts"),
    ("messages", "com.google.android.apps.messaging"),
    ("sms", "com.google.android.apps.messaging"),
    ("calendar", "com.google.android.calendar"),
    ("clock", "com.google.android.deskclock"),
    ("alarm", "com.google.android.deskclock"),
    ("calculator", "com.google.android.calculator"),
    ("play store", "com.android.vending"),
    ("files", "com.google.android.apps.nbu.files"),
    ("whatsapp", "com.whatsapp"),
    ("spotify", "com.spotify.music"),
];

/// App name → platform identifier lookup used by OpenApp.
#[derive(Debug, Clone)]
pub struct AppTable {
    entries: HashMap<String, String>,
}

impl AppTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (name, id) in BUILTIN_APPS {
            table.insert(name, id);
        }
        table
    }

    /// Built-in table with `overrides` (usually the `[apps]` config section) on top.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::builtin();
        for (name, id) in overrides {
            table.insert(name, id);
        }
        table
    }

    pub fn insert(&mut self, name: &str, identifier: &str) {
        let key = normalize(name);
        if key.is_empty() {
            return;
        }
        self.entries.insert(key, identifier.trim().to_string());
    }

    /// Case and whitespace insensitive. A name that already looks like a
    /// package identifier is returned when it is one of the known values.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let key = normalize(name);
        if let Some(id) = self.entries.get(&key) {
            return Some(id);
        }
        self.entries
            .values()
            .find(|id| id.eq_ignore_ascii_case(name.trim()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AppTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
