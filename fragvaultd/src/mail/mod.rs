pub mod receiver;

pub use receiver::{
    CreateTaskReceiver, MailError, MailReceiverConfig, MailUser, ReceivedMail, RoutingRule,
    StaticUserDirectory, TaskDraft, TaskPriority, UserDirectory,
};
