pub mod db_to_service;

pub use db_to_service::{
    ChannelRow, ConversationParticipantRow, ConversationRow, MessageRow, ParticipantRow,
    RecordLinkRow, RecordProfileRow,
};
