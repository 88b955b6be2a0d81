//! In-memory storage.

use super::{BoxFuture, PersistedBoard, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Ephemeral storage for tests and offline sessions.
#[derive(Default)]
pub struct MemoryStorage {
    boards: RwLock<HashMap<String, PersistedBoard>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn save(&self, board: &PersistedBoard) -> BoxFuture<'_, StorageResult<()>> {
        let board = board.clone();
        Box::pin(async move {
            let mut boards = self.boards.write().map_err(lock_error)?;
            boards.insert(board.id.clone(), board);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<PersistedBoard>> {
        let id = id.to_string();
        Box::pin(async move {
            let boards = self.boards.read().map_err(lock_error)?;
            boards.get(&id).cloned().ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.boards.write().map_err(lock_error)?.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let boards = self.boards.read().map_err(lock_error)?;
            Ok(boards.keys().cloned().collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.boards.read().map_err(lock_error)?.contains_key(&id)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Board;
    use crate::shapes::Shape;
    use crate::storage::block_on;
    use kurbo::Point;

    #[test]
    fn test_save_and_hydrate() {
        let storage = MemoryStorage::new();
        let mut board = Board::new("b1");
        board.upsert_shape(Shape::rectangle(Point::new(1.0, 2.0), 30.0, 40.0));
        block_on(storage.save(&board.to_persisted())).unwrap();

        let loaded = block_on(storage.load("b1")).unwrap();
        let restored = Board::hydrate(&loaded);
        assert_eq!(restored.shapes_ordered().count(), 1);
    }

    #[test]
    fn test_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(block_on(storage.load("missing")), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_exists_delete_list() {
        let storage = MemoryStorage::new();
        block_on(storage.save(&PersistedBoard::new("a"))).unwrap();
        block_on(storage.save(&PersistedBoard::new("b"))).unwrap();
        assert!(block_on(storage.exists("a")).unwrap());

        let mut ids = block_on(storage.list()).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        block_on(storage.delete("a")).unwrap();
        assert!(!block_on(storage.exists("a")).unwrap());
    }
}
