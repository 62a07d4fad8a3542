// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only device event log, with optional redirect to a `target` device (§3).

use crate::error::{Error, ErrorKind};

/// One recorded event envelope, e.g. an id like `"usb:AA:AA:06"` with a captured payload.
#[derive(Debug, Clone)]
pub struct Event
{
    pub id: String,
    pub data: Vec<u8>,
}

/// An append-only, cursor-scanned event log. Devices with a `target` redirect route their
/// `save_event`/`load_event`/`get_events`/`clear_events` calls onto the target's log
/// instead of their own — modeled here by the caller holding the target's `EventLog`
/// directly rather than this type knowing about redirection.
#[derive(Debug, Default, Clone)]
pub struct EventLog
{
    events: Vec<Event>,
}

impl EventLog
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn save(&mut self, id: &str, data: Vec<u8>)
    {
        self.events.push(Event { id: id.to_string(), data });
    }

    /// Loads the event matching `id`, scanning forward from `cursor`. On no match in the
    /// forward scan, falls back to a full search from the start; a second miss is an error.
    pub fn load(&self, id: &str, cursor: usize) -> Result<(&Event, usize), Error>
    {
        if let Some((offset, event)) = self.events.iter().enumerate().skip(cursor).find(|(_, e)| e.id == id) {
            return Ok((event, offset + 1));
        }

        if let Some((offset, event)) = self.events.iter().enumerate().find(|(_, e)| e.id == id) {
            return Ok((event, offset + 1));
        }

        Err(ErrorKind::NotFound(Some(format!("event {id:?}"))).error())
    }

    pub fn get_all(&self) -> &[Event]
    {
        &self.events
    }

    pub fn clear(&mut self)
    {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn load_scans_forward_then_falls_back_to_full_search()
    {
        let mut log = EventLog::new();
        log.save("a", vec![1]);
        log.save("b", vec![2]);
        log.save("a", vec![3]);

        let (event, cursor) = log.load("a", 1).unwrap();
        assert_eq!(event.data, vec![3]);

        // cursor now past the end; forward scan misses, falls back to full search
        let (event, _) = log.load("a", cursor).unwrap();
        assert_eq!(event.data, vec![1]);
    }

    #[test]
    fn load_missing_event_is_not_found()
    {
        let log = EventLog::new();
        assert!(log.load("nope", 0).is_err());
    }
}
