//! A [`Display`] with no window: annotated frames go to a sink and input is
//! scripted ahead of time.

use std::collections::BTreeMap;

use image::RgbImage;

use super::render::render_overlay;
use super::source::{Display, InputEvent};
use crate::error::Result;
use crate::recorder::VideoSink;
use crate::tracker::Overlay;

pub struct HeadlessDisplay<W: VideoSink> {
    sink: Option<W>,
    script: BTreeMap<u64, Vec<InputEvent>>,
    shown: u64,
    last_status: Option<String>,
}

impl<W: VideoSink> HeadlessDisplay<W> {
    pub fn new(sink: Option<W>) -> Self {
        Self {
            sink,
            script: BTreeMap::new(),
            shown: 0,
            last_status: None,
        }
    }

    /// Deliver `event` right after the `frame`-th frame (1-based) is shown.
    pub fn schedule(&mut self, frame: u64, event: InputEvent) -> &mut Self {
        self.script.entry(frame).or_default().push(event);
        self
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }

    /// Status line of the most recent overlay that had one.
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Flush and hand back the sink.
    pub fn finish(mut self) -> Result<Option<W>> {
        if let Some(sink) = self.sink.as_mut() {
            sink.finish()?;
        }
        Ok(self.sink)
    }
}

impl<W: VideoSink> Display for HeadlessDisplay<W> {
    fn show(&mut self, frame: &RgbImage, overlay: &Overlay) -> Result<Vec<InputEvent>> {
        self.shown += 1;
        if overlay.status.is_some() {
            self.last_status.clone_from(&overlay.status);
        }
        if let Some(sink) = self.sink.as_mut() {
            let mut annotated = frame.clone();
            render_overlay(&mut annotated, overlay);
            sink.write_frame(&annotated)?;
        }
        Ok(self.script.remove(&self.shown).unwrap_or_default())
    }
}
