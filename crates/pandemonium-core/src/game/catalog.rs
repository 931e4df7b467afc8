use std::sync::Arc;

use tracing::debug;

use super::{GameDefinition, dxhr};
use crate::error::{Error, Result};
use crate::preset::GameId;

/// The games this build knows about.
#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    games: Vec<Arc<GameDefinition>>,
}

impl GameCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in game registered.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        catalog.register(dxhr::definition()?)?;
        Ok(catalog)
    }

    pub fn register(&mut self, game: GameDefinition) -> Result<Arc<GameDefinition>> {
        if self.get(game.id()).is_some() {
            return Err(Error::InvalidConfig(format!(
                "game {} is already registered",
                game.id()
            )));
        }

        debug!(
            "Registered game {} ({}, {} effects)",
            game.name(),
            game.id(),
            game.effects().len()
        );
        let game = Arc::new(game);
        self.games.push(Arc::clone(&game));
        Ok(game)
    }

    pub fn get(&self, id: GameId) -> Option<&Arc<GameDefinition>> {
        self.games.iter().find(|game| game.id() == id)
    }

    /// Look up a game by id or by name, ignoring case.
    pub fn find(&self, query: &str) -> Result<&Arc<GameDefinition>> {
        let query = query.trim();
        let by_id = query.parse::<GameId>().ok().and_then(|id| self.get(id));
        by_id
            .or_else(|| {
                self.games
                    .iter()
                    .find(|game| game.name().eq_ignore_ascii_case(query))
            })
            .ok_or_else(|| Error::UnknownGame(query.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<GameDefinition>> {
        self.games.iter()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: u128, name: &str) -> GameDefinition {
        GameDefinition::builder(GameId::from_u128(id), name)
            .executable("game.exe")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtin_contains_dxhr() {
        let catalog = GameCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 1);
        let game = catalog.get(dxhr::ID).unwrap();
        assert_eq!(game.name(), "Deus Ex: Human Revolution");
    }

    #[test]
    fn test_find_by_id_or_name() {
        let mut catalog = GameCatalog::new();
        catalog.register(game(1, "First Game")).unwrap();
        catalog.register(game(2, "Second Game")).unwrap();

        let id = GameId::from_u128(2).to_string();
        assert_eq!(catalog.find(&id).unwrap().name(), "Second Game");
        assert_eq!(catalog.find("first game").unwrap().id(), GameId::from_u128(1));
        assert!(matches!(catalog.find("third"), Err(Error::UnknownGame(_))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut catalog = GameCatalog::new();
        catalog.register(game(1, "One")).unwrap();
        let result = catalog.register(game(1, "Other"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert_eq!(catalog.len(), 1);
    }
}
