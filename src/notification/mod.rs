pub mod center;
pub mod fanout;
pub mod model;

pub use center::{Channel, FanoutEvent, NotificationCenter, SubscriptionState, NOTIFICATION_TTL};
pub use fanout::{chat_notification, friend_request_notification, NotificationFanout};
pub use model::{
    ChatSession, FriendRequest, FriendRequestStatus, Notification, NotificationKind,
    PendingNotification,
};
