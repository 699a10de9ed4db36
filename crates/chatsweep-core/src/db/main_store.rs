//! Chat, knowledge, memory and file tables

use super::{parse_url, Bind, Location, RawDocument, Session, Statement, StoreKind};
use crate::error::Result;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::rc::Rc;

const CHAT_DOCUMENTS: Statement = Statement {
    sqlite: "SELECT id, chat FROM chat",
    postgres: "SELECT id::text, chat::text FROM chat",
};

const KNOWLEDGE_DOCUMENTS: Statement = Statement {
    sqlite: "SELECT id, data FROM knowledge",
    postgres: "SELECT id::text, data::text FROM knowledge",
};

const FILE_METAS: Statement = Statement {
    sqlite: "SELECT id, meta FROM file",
    postgres: "SELECT id::text, meta::text FROM file",
};

const MEMORY_USER_IDS: Statement = Statement {
    sqlite: "SELECT DISTINCT user_id FROM memory",
    postgres: "SELECT DISTINCT user_id::text FROM memory",
};

const FILE_IDS: Statement = Statement {
    sqlite: "SELECT id FROM file",
    postgres: "SELECT id::text FROM file",
};

const FILE_PATHS: Statement = Statement {
    sqlite: "SELECT DISTINCT path FROM file WHERE id IN (SELECT value FROM json_each(?1))",
    postgres: "SELECT DISTINCT path::text FROM file WHERE id::text = ANY($1)",
};

const SELECT_EXPIRED_CHATS: Statement = Statement {
    sqlite: "SELECT id FROM chat WHERE NOT archived AND created_at < ?1",
    postgres: "SELECT id::text FROM chat WHERE NOT archived AND created_at < $1",
};

const DELETE_EXPIRED_CHATS: Statement = Statement {
    sqlite: "DELETE FROM chat WHERE NOT archived AND created_at < ?1",
    postgres: "DELETE FROM chat WHERE NOT archived AND created_at < $1",
};

const SELECT_FILES: Statement = Statement {
    sqlite: "SELECT id FROM file WHERE id IN (SELECT value FROM json_each(?1))",
    postgres: "SELECT id::text FROM file WHERE id::text = ANY($1)",
};

const DELETE_FILES: Statement = Statement {
    sqlite: "DELETE FROM file WHERE id IN (SELECT value FROM json_each(?1))",
    postgres: "DELETE FROM file WHERE id::text = ANY($1)",
};

/// Handle to the application's relational database
pub struct MainStore {
    session: Rc<Session>,
    location: Location,
}

impl MainStore {
    /// Connect by URL and begin the run's transaction
    pub fn open(url: &str) -> Result<Self> {
        let location = parse_url(url)?;
        let session = Session::connect(StoreKind::Main, &location, url)?;
        Ok(Self {
            session: Rc::new(session),
            location,
        })
    }

    /// Wrap an already-open SQLite connection and begin the run's transaction
    pub fn from_connection(conn: Connection) -> Result<Self> {
        Ok(Self {
            session: Rc::new(Session::sqlite(conn)?),
            location: Location::Memory,
        })
    }

    pub(crate) fn session(&self) -> &Rc<Session> {
        &self.session
    }

    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    /// Commits every table the session covers, including a vector store
    /// sharing it.
    pub fn commit(&self) -> Result<()> {
        self.session.commit()
    }

    /// Close the session. While a vector store still shares it, the session
    /// closes when that store is dropped.
    pub fn close(self) -> Result<()> {
        match Rc::try_unwrap(self.session) {
            Ok(session) => session.close(),
            Err(_) => Ok(()),
        }
    }

    pub fn chat_documents(&self) -> Result<Vec<RawDocument>> {
        self.session.documents(CHAT_DOCUMENTS)
    }

    pub fn knowledge_documents(&self) -> Result<Vec<RawDocument>> {
        self.session.documents(KNOWLEDGE_DOCUMENTS)
    }

    /// `meta` document of every file row
    pub fn file_metas(&self) -> Result<Vec<RawDocument>> {
        self.session.documents(FILE_METAS)
    }

    pub fn memory_user_ids(&self) -> Result<BTreeSet<String>> {
        let ids = self.session.texts(MEMORY_USER_IDS, Bind::Nothing)?;
        Ok(ids.into_iter().collect())
    }

    pub fn file_ids(&self) -> Result<BTreeSet<String>> {
        let ids = self.session.texts(FILE_IDS, Bind::Nothing)?;
        Ok(ids.into_iter().collect())
    }

    /// Distinct `path` values of the given file rows. Issues no query for an
    /// empty id set.
    pub fn file_paths(&self, ids: &BTreeSet<String>) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.session.texts(FILE_PATHS, Bind::Texts(ids))
    }

    /// Ids of unarchived chats created strictly before `cutoff` (epoch seconds)
    pub fn select_expired_chats(&self, cutoff: i64) -> Result<Vec<String>> {
        self.session.texts(SELECT_EXPIRED_CHATS, Bind::Int(cutoff))
    }

    pub fn delete_expired_chats(&self, cutoff: i64) -> Result<usize> {
        self.session.execute(DELETE_EXPIRED_CHATS, Bind::Int(cutoff))
    }

    pub fn select_files(&self, ids: &BTreeSet<String>) -> Result<Vec<String>> {
        self.session.texts(SELECT_FILES, Bind::Texts(ids))
    }

    pub fn delete_files(&self, ids: &BTreeSet<String>) -> Result<usize> {
        self.session.execute(DELETE_FILES, Bind::Texts(ids))
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        self.session.sqlite_connection()
    }
}
