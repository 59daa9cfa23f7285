// Engine events - State changes pushed from the engine to the presentation layer

use crate::messaging::notification::Notification;
use crate::sequencer::timeline::TimeSignature;
use crate::sequencer::transport::PlayMode;
use crate::sync::SyncStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunningChanged(bool),
    PlayModeChanged(PlayMode),
    BpmChanged(f64),
    TimeSignatureChanged(TimeSignature),
    HistoryChanged { can_undo: bool, can_redo: bool },
    /// Index into the setlist, None when setlist mode is off
    SetlistPositionChanged(Option<usize>),
    SyncStatusChanged(SyncStatus),
    /// The loaded file or setlist position changed; carries the new title
    TitleChanged(String),
    Notification(Notification),
}
