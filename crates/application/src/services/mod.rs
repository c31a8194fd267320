mod direct_messaging;
mod room_messaging;
mod typing;

#[cfg(test)]
pub(crate) mod test_support;

pub use direct_messaging::{DirectMessagingDependencies, DirectMessagingService};
pub use room_messaging::{RoomMessagingDependencies, RoomMessagingService};
pub use typing::TypingNotifier;
