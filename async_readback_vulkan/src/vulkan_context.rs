/// GpuContext - Shared GPU state for every Vulkan readback object
///
/// Contains everything needed for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue for command submission
/// - Command pool and the command buffer currently being recorded

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// Command pool plus the command buffer being recorded
///
/// Vulkan requires external synchronization of a pool for allocation,
/// recording, and freeing, so all three go through the same mutex.
pub(crate) struct CommandRecorder {
    pub(crate) pool: vk::CommandPool,
    /// Recording started, not yet submitted
    pub(crate) pending: Option<vk::CommandBuffer>,
}

/// Shared GPU context for all Vulkan readback resources.
///
/// Shared (via `Arc`) by the device and by every texture, staging buffer and
/// fence it hands out. Readback sessions can outlive the device object, so
/// the last owner of the context tears down the Vulkan device and instance.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator (shared, requires mutex for thread safety)
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// Graphics queue used for copies and uploads
    pub graphics_queue: vk::Queue,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// `nonCoherentAtomSize` of the physical device
    pub non_coherent_atom_size: u64,

    pub(crate) commands: Mutex<CommandRecorder>,

    instance: ash::Instance,

    /// Debug utils loader (for validation layers)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,

    /// Keeps the Vulkan library loaded until the instance is gone
    _entry: ash::Entry,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// Takes ownership of every handle: they are destroyed when the last
    /// `Arc<GpuContext>` drops.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        non_coherent_atom_size: u64,
        command_pool: vk::CommandPool,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
            graphics_queue,
            graphics_queue_family,
            non_coherent_atom_size,
            commands: Mutex::new(CommandRecorder {
                pool: command_pool,
                pending: None,
            }),
            instance,
            debug_utils_loader,
            debug_messenger,
            _entry: entry,
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Command pool (frees any command buffer still pending)
            let commands = match self.commands.get_mut() {
                Ok(commands) => commands,
                Err(poisoned) => poisoned.into_inner(),
            };
            commands.pending = None;
            self.device.destroy_command_pool(commands.pool, None);

            // 2. Allocator: frees VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 3. Debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils_loader, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 4. Device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
