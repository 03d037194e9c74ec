pub mod room;
pub mod user;

pub use room::{
    ApiResponse, CloseRoomRequest, CreateRoomRequest, JoinRoomRequest, RoomId, RoomSession,
    RoomStatus, RoomStatusResponse,
};
pub use user::{Credential, Username};
