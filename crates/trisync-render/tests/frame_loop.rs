// SPDX-License-Identifier: CEPL-1.0
//! Drives `FrameScheduler` against a recording backend.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use trisync_render::{
    Acquire, FrameBackend, FrameOutcome, FrameScheduler, RenderSize, SwapchainStatus,
    WindowSystem,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    Wait(usize),
    Acquire(usize),
    Reset(usize),
    Record(usize, u32),
    Submit(usize),
    Present(usize, u32),
    WaitIdle,
    Recreate(RenderSize),
}

/// Object identities of the resources a real backend owns. Swapchain-scoped
/// ones get fresh ids on every rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Identities {
    pipeline: u64,
    render_pass: u64,
    command_pool: u64,
    swapchain: u64,
    image_views: u64,
    framebuffers: u64,
}

struct RecordingBackend {
    slots: usize,
    images: u32,
    next_image: u32,
    calls: Vec<Call>,
    acquire_script: VecDeque<Option<Acquire>>,
    present_script: VecDeque<SwapchainStatus>,
    slots_after_recreate: Option<usize>,
    ids: Identities,
    next_id: u64,
    fail_wait_on: Option<usize>,
}

impl RecordingBackend {
    fn new(slots: usize) -> Self {
        RecordingBackend {
            slots,
            images: slots as u32,
            next_image: 0,
            calls: Vec::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            slots_after_recreate: None,
            ids: Identities {
                pipeline: 1,
                render_pass: 2,
                command_pool: 3,
                swapchain: 4,
                image_views: 5,
                framebuffers: 6,
            },
            next_id: 7,
            fail_wait_on: None,
        }
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl FrameBackend for RecordingBackend {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Wait(slot));
        if self.fail_wait_on == Some(self.count(|c| matches!(c, Call::Wait(_)))) {
            return Err(anyhow!("failed to wait for in-flight fence"));
        }
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<Acquire> {
        self.calls.push(Call::Acquire(slot));
        if let Some(Some(scripted)) = self.acquire_script.pop_front() {
            return Ok(scripted);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.images;
        Ok(Acquire::Image {
            index,
            suboptimal: false,
        })
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Reset(slot));
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.calls.push(Call::Record(slot, image_index));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Submit(slot));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<SwapchainStatus> {
        self.calls.push(Call::Present(slot, image_index));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(SwapchainStatus::Optimal))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.calls.push(Call::WaitIdle);
        Ok(())
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()> {
        self.calls.push(Call::Recreate(size));
        self.ids.swapchain = self.fresh_id();
        self.ids.image_views = self.fresh_id();
        self.ids.framebuffers = self.fresh_id();
        if let Some(n) = self.slots_after_recreate {
            self.slots = n;
            self.images = n as u32;
        }
        self.next_image = 0;
        Ok(())
    }
}

struct FakeWindow {
    size: RenderSize,
    close_after_polls: Option<usize>,
    polls: usize,
}

impl FakeWindow {
    fn new(width: u32, height: u32) -> Self {
        FakeWindow {
            size: RenderSize::new(width, height),
            close_after_polls: None,
            polls: 0,
        }
    }
}

impl WindowSystem for FakeWindow {
    fn poll_events(&mut self) {
        self.polls += 1;
    }

    fn wait_events(&mut self) {}

    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }

    fn should_close(&self) -> bool {
        self.close_after_polls.is_some_and(|n| self.polls > n)
    }
}

#[test]
fn four_clean_frames_visit_slots_in_order() {
    let mut backend = RecordingBackend::new(3);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    let mut visited = Vec::new();
    for _ in 0..4 {
        visited.push(sched.current_slot());
        sched.draw_frame(&mut backend, &mut window).unwrap();
    }

    assert_eq!(visited, vec![0, 1, 2, 0]);
    assert_eq!(backend.count(|c| matches!(c, Call::Wait(_))), 4);
    assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 4);
    assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 4);
    assert_eq!(backend.count(|c| matches!(c, Call::Recreate(_))), 0);
    assert_eq!(sched.current_slot(), 1);
}

#[test]
fn per_frame_call_order() {
    let mut backend = RecordingBackend::new(2);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(2);

    sched.draw_frame(&mut backend, &mut window).unwrap();

    assert_eq!(
        backend.calls,
        vec![
            Call::Wait(0),
            Call::Acquire(0),
            Call::Reset(0),
            Call::Record(0, 0),
            Call::Submit(0),
            Call::Present(0, 0),
        ]
    );
}

#[test]
fn n_clean_frames_return_to_the_starting_slot() {
    for n in 1..=4 {
        let mut backend = RecordingBackend::new(n);
        let mut window = FakeWindow::new(320, 240);
        let mut sched = FrameScheduler::new(n);
        let start = sched.current_slot();
        for _ in 0..n {
            sched.draw_frame(&mut backend, &mut window).unwrap();
        }
        assert_eq!(sched.current_slot(), start, "slot count {n}");
    }
}

#[test]
fn out_of_date_on_second_of_five_frames() {
    let mut backend = RecordingBackend::new(3);
    backend.acquire_script = VecDeque::from(vec![None, Some(Acquire::OutOfDate)]);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    let first = sched.draw_frame(&mut backend, &mut window).unwrap();
    assert!(matches!(first, FrameOutcome::Presented { slot: 0, .. }));

    let calls_before = backend.calls.len();
    let second = sched.draw_frame(&mut backend, &mut window).unwrap();
    assert_eq!(second, FrameOutcome::Recreated);
    assert_eq!(sched.current_slot(), 0);

    let second_calls = backend.calls[calls_before..].to_vec();
    assert_eq!(
        second_calls,
        [
            Call::Wait(1),
            Call::Acquire(1),
            Call::WaitIdle,
            Call::Recreate(RenderSize::new(800, 600)),
        ]
    );

    for _ in 0..3 {
        sched.draw_frame(&mut backend, &mut window).unwrap();
    }

    assert_eq!(backend.count(|c| matches!(c, Call::Recreate(_))), 1);
    assert_eq!(backend.count(|c| matches!(c, Call::Wait(_))), 5);
    assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 4);
    assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 4);
    // The fence of the abandoned slot was never reset.
    assert!(!second_calls.contains(&Call::Reset(1)));
    assert_eq!(sched.stats().recreations, 1);
    assert_eq!(sched.stats().frames_presented, 4);
}

#[test]
fn suboptimal_present_still_shows_the_frame_then_rebuilds() {
    let mut backend = RecordingBackend::new(3);
    backend.present_script = VecDeque::from(vec![
        SwapchainStatus::Optimal,
        SwapchainStatus::Suboptimal,
    ]);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    sched.draw_frame(&mut backend, &mut window).unwrap();
    let outcome = sched.draw_frame(&mut backend, &mut window).unwrap();

    assert_eq!(
        outcome,
        FrameOutcome::PresentedThenRecreated {
            slot: 1,
            image_index: 1
        }
    );
    assert_eq!(sched.current_slot(), 0);
    assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 2);
    assert_eq!(backend.count(|c| matches!(c, Call::Recreate(_))), 1);
}

#[test]
fn suboptimal_acquire_is_deferred_until_after_present() {
    let mut backend = RecordingBackend::new(2);
    backend.acquire_script = VecDeque::from(vec![Some(Acquire::Image {
        index: 1,
        suboptimal: true,
    })]);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(2);

    sched.draw_frame(&mut backend, &mut window).unwrap();

    let present_at = backend
        .calls
        .iter()
        .position(|c| *c == Call::Present(0, 1))
        .unwrap();
    let recreate_at = backend
        .calls
        .iter()
        .position(|c| matches!(c, Call::Recreate(_)))
        .unwrap();
    assert!(present_at < recreate_at);
}

#[test]
fn recreation_resets_slot_and_keeps_pipeline_objects() {
    let mut backend = RecordingBackend::new(3);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    sched.draw_frame(&mut backend, &mut window).unwrap();
    sched.draw_frame(&mut backend, &mut window).unwrap();
    assert_eq!(sched.current_slot(), 2);

    let before = backend.ids;
    backend.present_script = VecDeque::from(vec![SwapchainStatus::OutOfDate]);
    window.size = RenderSize::new(1280, 720);
    sched.draw_frame(&mut backend, &mut window).unwrap();
    let after = backend.ids;

    assert_eq!(sched.current_slot(), 0);
    assert_eq!(before.pipeline, after.pipeline);
    assert_eq!(before.render_pass, after.render_pass);
    assert_eq!(before.command_pool, after.command_pool);
    assert_ne!(before.swapchain, after.swapchain);
    assert_ne!(before.image_views, after.image_views);
    assert_ne!(before.framebuffers, after.framebuffers);
    assert!(backend
        .calls
        .contains(&Call::Recreate(RenderSize::new(1280, 720))));
}

#[test]
fn resize_flag_triggers_exactly_one_rebuild() {
    let mut backend = RecordingBackend::new(3);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);
    let flag = sched.resize_flag();

    flag.notify();
    sched.draw_frame(&mut backend, &mut window).unwrap();
    sched.draw_frame(&mut backend, &mut window).unwrap();

    assert_eq!(backend.count(|c| matches!(c, Call::Recreate(_))), 1);
    assert!(!flag.is_set());
    assert_eq!(sched.current_slot(), 1);
}

#[test]
fn slot_count_follows_new_image_count() {
    let mut backend = RecordingBackend::new(3);
    backend.slots_after_recreate = Some(2);
    backend.acquire_script = VecDeque::from(vec![Some(Acquire::OutOfDate)]);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    sched.draw_frame(&mut backend, &mut window).unwrap();
    assert_eq!(sched.slot_count(), 2);

    let mut visited = Vec::new();
    for _ in 0..3 {
        visited.push(sched.current_slot());
        sched.draw_frame(&mut backend, &mut window).unwrap();
    }
    assert_eq!(visited, vec![0, 1, 0]);
}

#[test]
fn device_errors_propagate() {
    let mut backend = RecordingBackend::new(3);
    backend.fail_wait_on = Some(2);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    sched.draw_frame(&mut backend, &mut window).unwrap();
    let err = sched.draw_frame(&mut backend, &mut window).unwrap_err();
    assert!(err.to_string().contains("in-flight fence"));
    assert_eq!(backend.count(|c| matches!(c, Call::Acquire(_))), 1);
}

#[test]
fn run_stops_at_frame_limit_and_drains_the_device() {
    let mut backend = RecordingBackend::new(3);
    let mut window = FakeWindow::new(800, 600);
    let mut sched = FrameScheduler::new(3);

    let stats = sched.run(&mut backend, &mut window, Some(5)).unwrap();

    assert_eq!(stats.frames_presented, 5);
    assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
}

#[test]
fn run_stops_when_the_window_closes() {
    let mut backend = RecordingBackend::new(3);
    let mut window = FakeWindow::new(800, 600);
    window.close_after_polls = Some(2);
    let mut sched = FrameScheduler::new(3);

    let stats = sched.run(&mut backend, &mut window, None).unwrap();

    assert_eq!(stats.frames_presented, 2);
    assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
}
