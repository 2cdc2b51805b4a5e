// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contact and call-log storage using SQLite.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::{
    CallKind, CallLogStore, CallRecord, Contact, ContactId, ContactOrder, ContactStore,
    PhoneKind, PhoneNumber,
};

/// Shortest number for which a suffix match counts.
const MIN_MATCH_DIGITS: usize = 7;

/// Phonebook database.
pub struct SqlitePhonebook {
    conn: Mutex<Connection>,
}

impl SqlitePhonebook {
    /// Create or open the phonebook database in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("phonebook.db");
        info!("Opening phonebook database: {:?}", db_path);
        Self::with_connection(Connection::open(&db_path)?)
    }

    /// Private database, used by tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                organization TEXT,
                title TEXT,
                note TEXT,
                url TEXT,
                birthday TEXT,
                nickname TEXT,
                address TEXT,
                photo BLOB
             );
             CREATE TABLE IF NOT EXISTS phone_numbers (
                contact_id INTEGER NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
                number TEXT NOT NULL,
                kind TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS emails (
                contact_id INTEGER NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
                address TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL,
                cached_name TEXT,
                kind INTEGER NOT NULL,
                date INTEGER NOT NULL,
                duration INTEGER NOT NULL DEFAULT 0,
                is_new INTEGER NOT NULL DEFAULT 0,
                private INTEGER NOT NULL DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_calls_date ON calls(date DESC);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a contact; its `id` field is ignored.
    pub fn add_contact(&self, contact: &Contact) -> Result<ContactId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO contacts (display_name, organization, title, note, url, birthday, nickname, address, photo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                contact.display_name,
                contact.organization,
                contact.title,
                contact.note,
                contact.url,
                contact.birthday,
                contact.nickname,
                contact.address,
                contact.photo,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for phone in &contact.phones {
            tx.execute(
                "INSERT INTO phone_numbers (contact_id, number, kind) VALUES (?1, ?2, ?3)",
                params![id, phone.number, phone.kind.as_str()],
            )?;
        }
        for email in &contact.emails {
            tx.execute(
                "INSERT INTO emails (contact_id, address) VALUES (?1, ?2)",
                params![id, email],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Remove a contact and its numbers and emails.
    pub fn remove_contact(&self, id: ContactId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM contacts WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Insert a call record; its `id` field is ignored.
    pub fn add_call(&self, call: &CallRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO calls (number, cached_name, kind, date, duration, is_new, private)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                call.number,
                call.cached_name,
                call.kind.code(),
                call.timestamp.timestamp_millis(),
                call.duration_secs,
                call.is_new,
                call.private,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark every missed call as seen.
    pub fn clear_new_missed(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE calls SET is_new = 0 WHERE kind = ?1 AND is_new = 1",
            [CallKind::Missed.code()],
        )?;
        Ok(n)
    }

    /// SQLite's `data_version`: changes whenever another connection commits
    /// to the database file.
    pub fn data_version(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let version = conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn load_phones(conn: &Connection) -> Result<HashMap<ContactId, Vec<PhoneNumber>>> {
        let mut stmt =
            conn.prepare("SELECT contact_id, number, kind FROM phone_numbers ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                let kind: String = row.get(2)?;
                Ok((
                    row.get::<_, ContactId>(0)?,
                    PhoneNumber {
                        number: row.get(1)?,
                        kind: PhoneKind::from_str(&kind),
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut phones: HashMap<ContactId, Vec<PhoneNumber>> = HashMap::new();
        for (id, phone) in rows {
            phones.entry(id).or_default().push(phone);
        }
        Ok(phones)
    }

    fn load_emails(conn: &Connection) -> Result<HashMap<ContactId, Vec<String>>> {
        let mut stmt = conn.prepare("SELECT contact_id, address FROM emails ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, ContactId>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut emails: HashMap<ContactId, Vec<String>> = HashMap::new();
        for (id, email) in rows {
            emails.entry(id).or_default().push(email);
        }
        Ok(emails)
    }
}

impl ContactStore for SqlitePhonebook {
    fn list(&self, order: ContactOrder) -> Result<Vec<Contact>> {
        let conn = self.conn.lock();
        let sql = match order {
            ContactOrder::Indexed => {
                "SELECT id, display_name, organization, title, note, url, birthday, nickname, address, photo
                 FROM contacts ORDER BY id"
            }
            ContactOrder::Alphabetical => {
                "SELECT id, display_name, organization, title, note, url, birthday, nickname, address, photo
                 FROM contacts ORDER BY display_name COLLATE NOCASE, id"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let mut contacts = stmt
            .query_map([], |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    phones: Vec::new(),
                    emails: Vec::new(),
                    organization: row.get(2)?,
                    title: row.get(3)?,
                    note: row.get(4)?,
                    url: row.get(5)?,
                    birthday: row.get(6)?,
                    nickname: row.get(7)?,
                    address: row.get(8)?,
                    photo: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut phones = Self::load_phones(&conn)?;
        let mut emails = Self::load_emails(&conn)?;
        for contact in &mut contacts {
            contact.phones = phones.remove(&contact.id).unwrap_or_default();
            contact.emails = emails.remove(&contact.id).unwrap_or_default();
        }

        Ok(contacts)
    }

    fn by_number(&self, number: &str) -> Result<Vec<ContactId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT contact_id, number FROM phone_numbers ORDER BY contact_id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, ContactId>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut ids: Vec<ContactId> = Vec::new();
        for (id, stored) in rows {
            if numbers_match(number, &stored) && !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl CallLogStore for SqlitePhonebook {
    fn list(&self, kind: Option<CallKind>) -> Result<Vec<CallRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, number, cached_name, kind, date, duration, is_new, private
             FROM calls
             WHERE kind IN (1, 2, 3) AND (?1 IS NULL OR kind = ?1)
             ORDER BY date DESC, id DESC",
        )?;

        let rows = stmt
            .query_map([kind.map(|k| k.code())], |row| {
                let millis: i64 = row.get(4)?;
                Ok((
                    row.get::<_, i64>(3)?,
                    CallRecord {
                        id: row.get(0)?,
                        number: row.get(1)?,
                        cached_name: row.get(2)?,
                        kind: CallKind::Missed,
                        timestamp: Utc
                            .timestamp_millis_opt(millis)
                            .single()
                            .unwrap_or_default(),
                        duration_secs: row.get(5)?,
                        is_new: row.get(6)?,
                        private: row.get(7)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(code, mut call)| {
                call.kind = CallKind::from_code(code)?;
                Some(call)
            })
            .collect())
    }

    fn count(&self, kind: Option<CallKind>) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE kind IN (1, 2, 3) AND (?1 IS NULL OR kind = ?1)",
            [kind.map(|k| k.code())],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_since(&self, kind: Option<CallKind>, since: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calls
             WHERE kind IN (1, 2, 3) AND (?1 IS NULL OR kind = ?1) AND date > ?2",
            params![kind.map(|k| k.code()), since],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn new_missed_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE kind = ?1 AND is_new = 1",
            [CallKind::Missed.code()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Keep only the digits of a phone number.
fn digits(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Loose phone number comparison.
///
/// Numbers match when their digits are equal, or when both have at least
/// seven digits and one ends with the other (country prefixes differ).
pub fn numbers_match(a: &str, b: &str) -> bool {
    let a = digits(a);
    let b = digits(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    a.len() >= MIN_MATCH_DIGITS
        && b.len() >= MIN_MATCH_DIGITS
        && (a.ends_with(&b) || b.ends_with(&a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn seed() -> SqlitePhonebook {
        let store = SqlitePhonebook::open_in_memory().unwrap();
        store
            .add_contact(
                &Contact::new("Zoe Miller")
                    .with_phone("+44 20 7946 0000", PhoneKind::Work)
                    .with_email("zoe@example.com"),
            )
            .unwrap();
        store
            .add_contact(&Contact::new("adam Baker").with_phone("555-0101", PhoneKind::Cell))
            .unwrap();
        store
            .add_contact(&Contact::new("Mia Chen").with_phone("(020) 7946-0000", PhoneKind::Home))
            .unwrap();
        store
    }

    #[test]
    fn test_contacts_order() {
        let store = seed();
        let indexed: Vec<_> = ContactStore::list(&store, ContactOrder::Indexed)
            .unwrap()
            .into_iter()
            .map(|c| c.display_name)
            .collect();
        assert_eq!(indexed, vec!["Zoe Miller", "adam Baker", "Mia Chen"]);

        let alpha: Vec<_> = ContactStore::list(&store, ContactOrder::Alphabetical)
            .unwrap()
            .into_iter()
            .map(|c| c.display_name)
            .collect();
        assert_eq!(alpha, vec!["adam Baker", "Mia Chen", "Zoe Miller"]);
        assert_eq!(ContactStore::count(&store).unwrap(), 3);
    }

    #[test]
    fn test_contact_details_loaded() {
        let store = seed();
        let contacts = ContactStore::list(&store, ContactOrder::Indexed).unwrap();
        assert_eq!(contacts[0].emails, vec!["zoe@example.com".to_string()]);
        assert_eq!(contacts[0].phones[0].kind, PhoneKind::Work);
        assert!(contacts[1].emails.is_empty());
    }

    #[test]
    fn test_by_number() {
        let store = seed();
        let ids = store.by_number("20 7946 0000").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.by_number("5550101").unwrap().len(), 1);
        assert!(store.by_number("0101").unwrap().is_empty());
    }

    #[test]
    fn test_remove_contact_cascades() {
        let store = seed();
        let id = store.by_number("555-0101").unwrap()[0];
        store.remove_contact(id).unwrap();
        assert_eq!(ContactStore::count(&store).unwrap(), 2);
        assert!(store.by_number("555-0101").unwrap().is_empty());
    }

    #[test]
    fn test_calls() {
        let store = SqlitePhonebook::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .add_call(&CallRecord::new("111", CallKind::Incoming, now - Duration::hours(3)))
            .unwrap();
        store
            .add_call(&CallRecord::new("222", CallKind::Missed, now - Duration::hours(2)))
            .unwrap();
        store
            .add_call(&CallRecord::new("333", CallKind::Missed, now - Duration::hours(1)))
            .unwrap();

        let missed = CallLogStore::list(&store, Some(CallKind::Missed)).unwrap();
        assert_eq!(missed.len(), 2);
        assert_eq!(missed[0].number, "333");
        assert_eq!(CallLogStore::count(&store, None).unwrap(), 3);
        assert_eq!(CallLogStore::count(&store, Some(CallKind::Outgoing)).unwrap(), 0);
        assert_eq!(store.new_missed_count().unwrap(), 2);

        let since = (now - Duration::minutes(150)).timestamp_millis();
        assert_eq!(store.count_since(Some(CallKind::Missed), since).unwrap(), 2);
        assert_eq!(store.count_since(None, since).unwrap(), 2);

        assert_eq!(store.clear_new_missed().unwrap(), 2);
        assert_eq!(store.new_missed_count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_call_kinds_are_not_counted() {
        let store = SqlitePhonebook::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .add_call(&CallRecord::new("111", CallKind::Incoming, now))
            .unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO calls (number, kind, date) VALUES ('222', 5, ?1)",
                [now.timestamp_millis()],
            )
            .unwrap();

        let listed = CallLogStore::list(&store, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(CallLogStore::count(&store, None).unwrap(), listed.len());
        let since = (now - Duration::hours(1)).timestamp_millis();
        assert_eq!(store.count_since(None, since).unwrap(), 1);
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempdir().unwrap();
        {
            let store = SqlitePhonebook::new(dir.path()).unwrap();
            store.add_contact(&Contact::new("Persisted")).unwrap();
        }
        let store = SqlitePhonebook::new(dir.path()).unwrap();
        assert_eq!(ContactStore::count(&store).unwrap(), 1);
    }

    #[test]
    fn test_data_version_tracks_other_writers() {
        let dir = tempdir().unwrap();
        let server = SqlitePhonebook::new(dir.path()).unwrap();
        let before = server.data_version().unwrap();

        server.add_contact(&Contact::new("Own write")).unwrap();
        assert_eq!(server.data_version().unwrap(), before);

        let sync_tool = SqlitePhonebook::new(dir.path()).unwrap();
        sync_tool.add_contact(&Contact::new("Synced")).unwrap();
        assert_ne!(server.data_version().unwrap(), before);
    }

    #[test]
    fn test_numbers_match() {
        assert!(numbers_match("+1 (555) 010-2000", "15550102000"));
        assert!(numbers_match("+44 20 7946 0000", "20 7946 0000"));
        assert!(!numbers_match("+44 20 7946 0000", "020 7946 0000"));
        assert!(!numbers_match("123", "0123"));
        assert!(!numbers_match("", ""));
    }
}
