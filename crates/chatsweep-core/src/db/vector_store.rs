//! Document chunks in the vector database

use super::{parse_url, Bind, MainStore, Session, Statement, StoreKind};
use crate::error::Result;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::rc::Rc;

const COLLECTION_NAMES: Statement = Statement {
    sqlite: "SELECT DISTINCT collection_name FROM document_chunk",
    postgres: "SELECT DISTINCT collection_name::text FROM document_chunk",
};

const SELECT_CHUNKS: Statement = Statement {
    sqlite: "SELECT collection_name FROM document_chunk
             WHERE collection_name IN (SELECT value FROM json_each(?1))",
    postgres: "SELECT collection_name::text FROM document_chunk
               WHERE collection_name::text = ANY($1)",
};

const DELETE_CHUNKS: Statement = Statement {
    sqlite: "DELETE FROM document_chunk
             WHERE collection_name IN (SELECT value FROM json_each(?1))",
    postgres: "DELETE FROM document_chunk WHERE collection_name::text = ANY($1)",
};

/// Handle to the vector database
pub struct VectorStore {
    session: Rc<Session>,
    /// Set when the session belongs to the main store
    shared: bool,
}

impl VectorStore {
    /// Connect by URL and begin the run's transaction
    pub fn open(url: &str) -> Result<Self> {
        let location = parse_url(url)?;
        let session = Session::connect(StoreKind::Vector, &location, url)?;
        Ok(Self {
            session: Rc::new(session),
            shared: false,
        })
    }

    /// Like [`VectorStore::open`], but reuses `main`'s session when `url`
    /// names the same database. A second connection would wait on the
    /// first one's write lock.
    pub fn open_alongside(url: &str, main: &MainStore) -> Result<Self> {
        let location = parse_url(url)?;
        if main.location().same_database(&location) {
            return Ok(Self {
                session: Rc::clone(main.session()),
                shared: true,
            });
        }
        let session = Session::connect(StoreKind::Vector, &location, url)?;
        Ok(Self {
            session: Rc::new(session),
            shared: false,
        })
    }

    /// Wrap an already-open SQLite connection and begin the run's transaction
    pub fn from_connection(conn: Connection) -> Result<Self> {
        Ok(Self {
            session: Rc::new(Session::sqlite(conn)?),
            shared: false,
        })
    }

    /// Whether this store rides on the main store's transaction
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// A shared session is committed by [`MainStore::commit`].
    pub fn commit(&self) -> Result<()> {
        if self.shared {
            return Ok(());
        }
        self.session.commit()
    }

    pub fn close(self) -> Result<()> {
        if self.shared {
            return Ok(());
        }
        match Rc::try_unwrap(self.session) {
            Ok(session) => session.close(),
            Err(_) => Ok(()),
        }
    }

    /// Every collection that still owns at least one chunk
    pub fn collection_names(&self) -> Result<BTreeSet<String>> {
        let names = self.session.texts(COLLECTION_NAMES, Bind::Nothing)?;
        Ok(names.into_iter().collect())
    }

    /// One entry per chunk belonging to `collections`
    pub fn select_chunks(&self, collections: &BTreeSet<String>) -> Result<Vec<String>> {
        self.session.texts(SELECT_CHUNKS, Bind::Texts(collections))
    }

    pub fn delete_chunks(&self, collections: &BTreeSet<String>) -> Result<usize> {
        self.session.execute(DELETE_CHUNKS, Bind::Texts(collections))
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        self.session.sqlite_connection()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_chunks_by_collection() {
        let store = store();
        add_chunk(&store, "c1", "file-a");
        add_chunk(&store, "c2", "file-a");
        add_chunk(&store, "c3", "user-memory-1");

        let names = store.collection_names().unwrap();
        assert_eq!(names.len(), 2);

        let doomed: BTreeSet<String> = ["file-a".to_string()].into();
        assert_eq!(store.select_chunks(&doomed).unwrap(), vec!["file-a", "file-a"]);
        assert_eq!(store.delete_chunks(&doomed).unwrap(), 2);
        assert_eq!(
            store.collection_names().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["user-memory-1"]
        );
    }

    #[test]
    fn test_same_file_shares_main_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("webui.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(crate::db::main_store::fixtures::SCHEMA).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        drop(conn);
        let url = format!("sqlite://{}", path.display());

        let main = MainStore::open(&url).unwrap();
        let vector = VectorStore::open_alongside(path.to_str().unwrap(), &main).unwrap();
        assert!(vector.is_shared());

        add_chunk(&vector, "c1", "file-a");
        crate::db::main_store::fixtures::add_file(&main, "f1", Some("/a"), None);
        vector.commit().unwrap();
        vector.close().unwrap();
        main.commit().unwrap();
        main.close().unwrap();

        let reopened = VectorStore::open(&url).unwrap();
        assert!(!reopened.is_shared());
        assert_eq!(reopened.collection_names().unwrap().len(), 1);
        reopened.close().unwrap();
        assert_eq!(MainStore::open(&url).unwrap().file_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_distinct_files_get_own_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let main_path = dir.path().join("webui.db");
        let vector_path = dir.path().join("vector.db");
        Connection::open(&main_path).unwrap();
        Connection::open(&vector_path).unwrap().execute_batch(SCHEMA).unwrap();

        let main = MainStore::open(main_path.to_str().unwrap()).unwrap();
        let vector = VectorStore::open_alongside(vector_path.to_str().unwrap(), &main).unwrap();
        assert!(!vector.is_shared());
        assert!(vector.collection_names().unwrap().is_empty());
    }
}
