use streamchat_protocol::{ClientDirective, RoomId};

/// The single room currently bound to the realtime channel.
#[derive(Debug, Default)]
pub struct RoomBinding {
    current: Option<RoomId>,
}

impl RoomBinding {
    pub fn current(&self) -> Option<&RoomId> { self.current.as_ref() }

    pub fn is_active(&self, room: &RoomId) -> bool { self.current.as_ref() == Some(room) }

    /// Replace the binding. Returns the previous room when the binding
    /// actually changed, `None` when `room` was already current.
    pub fn set(&mut self, room: Option<RoomId>) -> Option<Option<RoomId>> {
        if self.current == room {
            return None;
        }
        Some(std::mem::replace(&mut self.current, room))
    }

    /// Join directive for the current binding, if any.
    pub fn join_directive(&self) -> Option<ClientDirective> {
        self.current
            .clone()
            .map(|room_id| ClientDirective::JoinChat { room_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_only_real_changes() {
        let mut b = RoomBinding::default();
        assert_eq!(b.set(None), None);
        assert_eq!(b.set(Some(RoomId::from("a"))), Some(None));
        assert_eq!(b.set(Some(RoomId::from("a"))), None);
        assert_eq!(b.set(Some(RoomId::from("b"))), Some(Some(RoomId::from("a"))));
        assert!(b.is_active(&RoomId::from("b")));
    }

    #[test]
    fn no_join_for_empty_binding() {
        let mut b = RoomBinding::default();
        assert!(b.join_directive().is_none());
        b.set(Some(RoomId::from("room-7")));
        assert_eq!(
            b.join_directive(),
            Some(ClientDirective::JoinChat { room_id: RoomId::from("room-7") })
        );
    }
}
