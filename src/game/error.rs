//! Game-layer errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("no free cell left for fruit on a {width}x{height} board")]
    BoardSaturated { width: i32, height: i32 },

    #[error("session is not accepting players")]
    SessionClosed,
}
