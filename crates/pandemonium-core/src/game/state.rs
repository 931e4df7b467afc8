use crate::engine::GameStatus;
use crate::error::Result;
use crate::process::Process;

/// Reads the game's own notion of where the player is.
///
/// Every method has a neutral default, so a game without a mapper is
/// treated as always playing.
pub trait GameStateMapper: Send {
    /// Whether the player is past the title screen and main menu.
    fn in_game(&mut self, process: &Process) -> Result<bool> {
        let _ = process;
        Ok(true)
    }

    /// Whether the game is paused or loading.
    fn is_paused(&mut self, process: &Process) -> Result<bool> {
        let _ = process;
        Ok(false)
    }

    /// Whether the run restarted since the previous call.
    fn has_reset(&mut self, process: &Process) -> Result<bool> {
        let _ = process;
        Ok(false)
    }

    fn poll(&mut self, process: &Process) -> Result<GameStatus> {
        let reset = self.has_reset(process)?;
        let in_game = self.in_game(process)?;
        let paused = self.is_paused(process)?;
        Ok(GameStatus {
            in_game,
            paused,
            reset,
        })
    }
}

/// Mapper for games without readable state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStateMapper;

impl GameStateMapper for DefaultStateMapper {}
