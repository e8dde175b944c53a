// Synchronization primitives and the frame cycle
//
// One fence (CPU waits on GPU) and two semaphores (GPU orders acquire ->
// render -> present). A single set is reused every frame, which caps the
// renderer at one frame in flight.

use ash::vk;
use std::sync::Arc;

use super::device::LogicalDevice;
use super::error::{RenderError, RenderResult};

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<LogicalDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<LogicalDevice>) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the very first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        // Created one at a time so a failure releases what already exists
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device,
        };

        unsafe {
            sync.image_available = sync
                .device
                .raw
                .create_semaphore(&semaphore_info, None)
                .map_err(RenderError::vk("vkCreateSemaphore"))?;
            sync.render_finished = sync
                .device
                .raw
                .create_semaphore(&semaphore_info, None)
                .map_err(RenderError::vk("vkCreateSemaphore"))?;
            sync.in_flight_fence = sync
                .device
                .raw
                .create_fence(&fence_info, None)
                .map_err(RenderError::vk("vkCreateFence"))?;
        }

        Ok(sync)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        // Destroying a null handle is a no-op
        unsafe {
            self.device.raw.destroy_semaphore(self.image_available, None);
            self.device.raw.destroy_semaphore(self.render_finished, None);
            self.device.raw.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Where the frame cycle currently is. After an error the cycle stays in the
/// state whose step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    WaitingFence,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// The GPU-facing steps of one frame. The Vulkan renderer implements this
/// over its real handles; tests drive the cycle with a recording fake.
pub trait FrameOps {
    /// Block until the previous frame's submission completes. No timeout.
    fn wait_for_fence(&mut self) -> RenderResult<()>;
    fn reset_fence(&mut self) -> RenderResult<()>;
    /// Next presentable image; signals image-available when it is free.
    fn acquire_image(&mut self) -> RenderResult<u32>;
    /// Reset the command buffer and record the frame for `image_index`.
    fn record(&mut self, image_index: u32) -> RenderResult<()>;
    /// Wait image-available, signal render-finished and the fence.
    fn submit(&mut self) -> RenderResult<()>;
    /// Present `image_index` once render-finished is signaled.
    fn present(&mut self, image_index: u32) -> RenderResult<()>;
}

/// Drives Idle -> WaitingFence -> Acquiring -> Recording -> Submitted ->
/// Presenting -> Idle, one frame per call.
#[derive(Debug)]
pub struct FrameCycle {
    state: FrameState,
    frames_presented: u64,
}

impl FrameCycle {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            frames_presented: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Run one full frame and return the image index that was presented.
    pub fn run<O: FrameOps + ?Sized>(&mut self, ops: &mut O) -> RenderResult<u32> {
        self.enter(FrameState::WaitingFence);
        ops.wait_for_fence()?;
        ops.reset_fence()?;

        self.enter(FrameState::Acquiring);
        let image_index = ops.acquire_image()?;

        self.enter(FrameState::Recording);
        ops.record(image_index)?;
        ops.submit()?;
        self.enter(FrameState::Submitted);

        self.enter(FrameState::Presenting);
        ops.present(image_index)?;

        self.enter(FrameState::Idle);
        self.frames_presented += 1;
        Ok(image_index)
    }

    fn enter(&mut self, next: FrameState) {
        log::trace!(
            "frame {}: {:?} -> {:?}",
            self.frames_presented,
            self.state,
            next
        );
        self.state = next;
    }
}

impl Default for FrameCycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Wait,
        Reset,
        Acquire(u32),
        Record(u32),
        Submit,
        Present(u32),
    }

    /// Fake GPU: submission leaves work pending, which completes (and signals
    /// the fence) only when the CPU waits on it.
    struct FakeGpu {
        events: Vec<Event>,
        fence_signaled: bool,
        gpu_pending: bool,
        image_count: u32,
        next_image: u32,
        fail_acquire: bool,
        fail_record: bool,
        fail_submit: bool,
    }

    impl FakeGpu {
        fn new(image_count: u32) -> Self {
            Self {
                events: Vec::new(),
                fence_signaled: true,
                gpu_pending: false,
                image_count,
                next_image: 0,
                fail_acquire: false,
                fail_record: false,
                fail_submit: false,
            }
        }

        fn positions(&self, wanted: Event) -> Vec<usize> {
            self.events
                .iter()
                .enumerate()
                .filter(|(_, e)| std::mem::discriminant(*e) == std::mem::discriminant(&wanted))
                .map(|(i, _)| i)
                .collect()
        }
    }

    impl FrameOps for FakeGpu {
        fn wait_for_fence(&mut self) -> RenderResult<()> {
            if self.gpu_pending {
                self.gpu_pending = false;
                self.fence_signaled = true;
            }
            assert!(self.fence_signaled, "wait on a fence nothing will signal");
            self.events.push(Event::Wait);
            Ok(())
        }

        fn reset_fence(&mut self) -> RenderResult<()> {
            self.fence_signaled = false;
            self.events.push(Event::Reset);
            Ok(())
        }

        fn acquire_image(&mut self) -> RenderResult<u32> {
            if self.fail_acquire {
                return Err(RenderError::SwapchainOutOfDate);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.events.push(Event::Acquire(index));
            Ok(index)
        }

        fn record(&mut self, image_index: u32) -> RenderResult<()> {
            assert!(!self.gpu_pending, "command buffer re-recorded while in flight");
            if self.fail_record {
                return Err(RenderError::Vulkan {
                    call: "vkEndCommandBuffer",
                    result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                });
            }
            self.events.push(Event::Record(image_index));
            Ok(())
        }

        fn submit(&mut self) -> RenderResult<()> {
            if self.fail_submit {
                return Err(RenderError::Vulkan {
                    call: "vkQueueSubmit",
                    result: vk::Result::ERROR_DEVICE_LOST,
                });
            }
            self.gpu_pending = true;
            self.events.push(Event::Submit);
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RenderResult<()> {
            self.events.push(Event::Present(image_index));
            Ok(())
        }
    }

    #[test]
    fn one_frame_follows_the_cycle() {
        let mut gpu = FakeGpu::new(3);
        let mut cycle = FrameCycle::new();

        let presented = cycle.run(&mut gpu).unwrap();

        assert_eq!(presented, 0);
        assert_eq!(cycle.state(), FrameState::Idle);
        assert_eq!(
            gpu.events,
            vec![
                Event::Wait,
                Event::Reset,
                Event::Acquire(0),
                Event::Record(0),
                Event::Submit,
                Event::Present(0),
            ]
        );
    }

    #[test]
    fn frames_never_overlap() {
        let mut gpu = FakeGpu::new(3);
        let mut cycle = FrameCycle::new();

        for _ in 0..7 {
            cycle.run(&mut gpu).unwrap();
        }
        assert_eq!(cycle.frames_presented(), 7);

        let waits = gpu.positions(Event::Wait);
        let submits = gpu.positions(Event::Submit);
        assert_eq!(waits.len(), 7);
        assert_eq!(submits.len(), 7);

        // Frame k+1's wait comes after frame k's submit, and frame k's
        // submit comes after its own wait
        for k in 0..6 {
            assert!(submits[k] < waits[k + 1]);
            assert!(waits[k] < submits[k]);
        }
    }

    #[test]
    fn images_are_acquired_in_turn() {
        let mut gpu = FakeGpu::new(2);
        let mut cycle = FrameCycle::new();

        let indices: Vec<u32> = (0..4).map(|_| cycle.run(&mut gpu).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 0, 1]);
    }

    #[test]
    fn submit_failure_is_fatal_and_skips_present() {
        let mut gpu = FakeGpu::new(3);
        gpu.fail_submit = true;
        let mut cycle = FrameCycle::new();

        let err = cycle.run(&mut gpu).unwrap_err();

        assert!(matches!(err, RenderError::Vulkan { call: "vkQueueSubmit", .. }));
        assert_eq!(cycle.state(), FrameState::Recording);
        assert_eq!(cycle.frames_presented(), 0);
        assert!(gpu.positions(Event::Present(0)).is_empty());
    }

    #[test]
    fn record_failure_skips_submit_and_present() {
        let mut gpu = FakeGpu::new(3);
        gpu.fail_record = true;
        let mut cycle = FrameCycle::new();

        let err = cycle.run(&mut gpu).unwrap_err();

        assert!(matches!(err, RenderError::Vulkan { call: "vkEndCommandBuffer", .. }));
        assert_eq!(cycle.state(), FrameState::Recording);
        assert_eq!(cycle.frames_presented(), 0);
        assert_eq!(gpu.events, vec![Event::Wait, Event::Reset, Event::Acquire(0)]);
    }

    #[test]
    fn out_of_date_acquire_stops_before_recording() {
        let mut gpu = FakeGpu::new(3);
        gpu.fail_acquire = true;
        let mut cycle = FrameCycle::new();

        let err = cycle.run(&mut gpu).unwrap_err();

        assert!(matches!(err, RenderError::SwapchainOutOfDate));
        assert_eq!(cycle.state(), FrameState::Acquiring);
        assert_eq!(gpu.events, vec![Event::Wait, Event::Reset]);
    }
}
