/// VulkanDevice - headless Vulkan instance, device and resource factory
///
/// Owns the instance, the logical device, the shared `GpuContext` and the
/// discard queue every resource created here defers its destruction to.
/// The frame loop drains that queue at its safe points through
/// `drain_discard_queue`; dropping the device waits for idle and drains it
/// one last time.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use prism_graphics::prism::discard::SafePoint;
use prism_graphics::prism::resource::{BufferDescriptor, ImageDescriptor};
use prism_graphics::prism::{DiscardQueue, Error, Result};
use prism_graphics::{prism_debug, prism_err, prism_info, prism_warn};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_backend::VulkanCommandBackend;
use crate::vulkan_context::GpuContext;
use crate::vulkan_sampler::{create_vk_sampler, SamplerType, VulkanSampler};
use crate::vulkan_texture::VulkanTexture;

const LOG_SOURCE: &str = "prism::vulkan";

/// Vulkan device configuration
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    /// Request VK_LAYER_KHRONOS_validation (needs the `vulkan-validation` feature)
    pub enable_validation: bool,
    pub app_name: String,
    /// (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Callback filtering when validation is on
    pub debug: crate::debug::DebugConfig,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Prism Application".to_string(),
            app_version: (0, 1, 0),
            debug: crate::debug::DebugConfig::default(),
        }
    }
}

/// Device extension loaders the command backend records through
#[derive(Clone)]
pub struct DeviceExtensions {
    pub push_descriptor: ash::khr::push_descriptor::Device,
    pub dynamic_state3: ash::ext::extended_dynamic_state3::Device,
    pub vertex_input: ash::ext::vertex_input_dynamic_state::Device,
}

/// Device extensions a physical device must support
const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 3] = [
    ash::khr::push_descriptor::NAME,
    ash::ext::extended_dynamic_state3::NAME,
    ash::ext::vertex_input_dynamic_state::NAME,
];

pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    anisotropy_supported: bool,

    context: Arc<GpuContext>,
    discard_queue: Arc<DiscardQueue>,
    extensions: DeviceExtensions,
    default_sampler: vk::Sampler,

    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanDevice {
    /// Create a headless device on the first GPU that supports the
    /// required dynamic-state extensions
    pub fn new(config: VulkanConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| Error::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid app name: {}", e)))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(
                    0,
                    config.app_version.0,
                    config.app_version.1,
                    config.app_version.2,
                ))
                .engine_name(c"Prism")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !validation {
                prism_warn!(LOG_SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            }

            let mut extension_names = Vec::new();
            let mut layer_names = Vec::new();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| Error::InitializationFailed(format!("Failed to create instance: {:?}", e)))?;

            let debug_utils = if validation {
                match Self::create_debug_messenger(&entry, &instance, &config) {
                    Ok(debug_utils) => Some(debug_utils),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            match Self::create_device(entry.clone(), instance.clone(), debug_utils.clone()) {
                Ok(device) => Ok(device),
                Err(e) => {
                    if let Some((loader, messenger)) = &debug_utils {
                        loader.destroy_debug_utils_messenger(*messenger, None);
                        crate::debug::cleanup_debug_config();
                    }
                    instance.destroy_instance(None);
                    Err(e)
                }
            }
        }
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &VulkanConfig,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(config.debug.clone());

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&debug_info, None) }
            .map_err(|e| prism_err!(LOG_SOURCE, "Failed to create debug messenger: {:?}", e))?;
        Ok((loader, messenger))
    }

    /// Supported device extension names
    unsafe fn device_extensions(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Vec<CString> {
        unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_default()
            .iter()
            .filter_map(|properties| properties.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect()
    }

    /// Pick a physical device and graphics queue family, preferring discrete GPUs
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e)))?;

        let mut candidates = Vec::new();
        for physical_device in physical_devices {
            let supported = unsafe { Self::device_extensions(instance, physical_device) };
            if !REQUIRED_DEVICE_EXTENSIONS
                .iter()
                .all(|required| supported.iter().any(|name| name.as_c_str() == *required))
            {
                continue;
            }

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let Some(graphics_family) = queue_families
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            else {
                continue;
            };

            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
            candidates.push((discrete, physical_device, graphics_family as u32));
        }

        candidates.sort_by_key(|(discrete, _, _)| !*discrete);
        candidates
            .into_iter()
            .next()
            .map(|(_, physical_device, family)| (physical_device, family))
            .ok_or_else(|| Error::InitializationFailed(
                "No Vulkan GPU with push descriptors and dynamic vertex input / blend state found".to_string(),
            ))
    }

    unsafe fn create_device(
        entry: ash::Entry,
        instance: ash::Instance,
        debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Result<Self> {
        let (physical_device, graphics_family) = unsafe { Self::pick_physical_device(&instance)? };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown GPU".to_string());
        let supported_features = unsafe { instance.get_physical_device_features(physical_device) };
        let anisotropy_supported = supported_features.sampler_anisotropy == vk::TRUE;

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family)
            .queue_priorities(&queue_priorities)];

        let extension_names: Vec<_> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_supported);
        let mut dynamic_state3_features = vk::PhysicalDeviceExtendedDynamicState3FeaturesEXT::default()
            .extended_dynamic_state3_color_blend_enable(true)
            .extended_dynamic_state3_color_blend_equation(true);
        let mut vertex_input_features =
            vk::PhysicalDeviceVertexInputDynamicStateFeaturesEXT::default().vertex_input_dynamic_state(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut dynamic_state3_features)
            .push_next(&mut vertex_input_features);

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .map_err(|e| Error::InitializationFailed(format!("Failed to create device: {:?}", e)))?;

        // Everything below must release the device on failure
        let destroy_device = |device: &ash::Device| unsafe { device.destroy_device(None) };

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                destroy_device(&device);
                return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
            }
        };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);
        let upload_command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                drop(allocator);
                destroy_device(&device);
                return Err(Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e)));
            }
        };

        let default_sampler = match create_vk_sampler(&device, SamplerType::LinearRepeat, anisotropy_supported) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_command_pool(upload_command_pool, None) };
                drop(allocator);
                destroy_device(&device);
                return Err(e);
            }
        };

        let extensions = DeviceExtensions {
            push_descriptor: ash::khr::push_descriptor::Device::new(&instance, &device),
            dynamic_state3: ash::ext::extended_dynamic_state3::Device::new(&instance, &device),
            vertex_input: ash::ext::vertex_input_dynamic_state::Device::new(&instance, &device),
        };

        let context = Arc::new(GpuContext::new(
            device,
            allocator,
            graphics_queue,
            graphics_family,
            upload_command_pool,
        ));

        prism_info!(LOG_SOURCE, "Vulkan device '{}' ready (graphics family {})", device_name, graphics_family);

        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            device_name,
            anisotropy_supported,
            context,
            discard_queue: Arc::new(DiscardQueue::new()),
            extensions,
            default_sampler,
            debug_utils,
        })
    }

    // ===== ACCESSORS =====

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    pub fn discard_queue(&self) -> &Arc<DiscardQueue> {
        &self.discard_queue
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn extensions(&self) -> &DeviceExtensions {
        &self.extensions
    }

    // ===== RESOURCES =====

    /// Describe a texture; the image is created when a draw first needs it
    pub fn create_texture(&self, descriptor: ImageDescriptor, pixels: Option<Vec<u8>>) -> Result<Arc<VulkanTexture>> {
        let texture = VulkanTexture::new(self.context.clone(), self.discard_queue.clone(), descriptor, pixels)?;
        Ok(Arc::new(texture))
    }

    /// Describe a buffer; the VkBuffer is created when a draw first needs it
    pub fn create_buffer(&self, descriptor: BufferDescriptor, data: Option<&[u8]>) -> Result<Arc<VulkanBuffer>> {
        if descriptor.size == 0 {
            return Err(Error::InvalidResource("Buffer size must be greater than zero".to_string()));
        }
        Ok(Arc::new(VulkanBuffer::new(
            self.context.clone(),
            self.discard_queue.clone(),
            descriptor,
            data,
        )))
    }

    pub fn create_sampler(&self, sampler_type: SamplerType) -> Result<Arc<VulkanSampler>> {
        let sampler = VulkanSampler::new(
            self.context.clone(),
            self.discard_queue.clone(),
            sampler_type,
            self.anisotropy_supported,
        )?;
        Ok(Arc::new(sampler))
    }

    /// Backend recording into `command_buffer` (must be in the recording state)
    pub fn command_backend(&self, command_buffer: vk::CommandBuffer) -> VulkanCommandBackend {
        VulkanCommandBackend::new(
            self.context.device.clone(),
            self.extensions.clone(),
            command_buffer,
            self.default_sampler,
        )
    }

    // ===== SYNCHRONIZATION =====

    /// Run every deferred destruction; the caller vouches for `point`
    pub fn drain_discard_queue(&self, point: SafePoint) -> usize {
        self.discard_queue.drain_at(point)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.context.device.device_wait_idle()
                .map_err(|e| prism_err!(LOG_SOURCE, "Failed to wait for device idle: {:?}", e))
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // 1. Nothing may be in flight past this point
            self.context.device.device_wait_idle().ok();

            // 2. Deferred destructions release their GpuContext references
            let drained = self.discard_queue.drain_at(SafePoint::DeviceIdle);
            if drained > 0 {
                prism_debug!(LOG_SOURCE, "Destroyed {} deferred object(s) at shutdown", drained);
            }

            // 3. Objects owned by the device itself
            self.context.device.destroy_sampler(self.default_sampler, None);
            if let Ok(pool) = self.context.upload_command_pool.lock() {
                self.context.device.destroy_command_pool(*pool, None);
            }

            // 4. Allocator before the device
            match Arc::get_mut(&mut self.context) {
                Some(context) => ManuallyDrop::drop(&mut context.allocator),
                None => prism_warn!(
                    LOG_SOURCE,
                    "{} GPU resource(s) still alive at device teardown, allocator leaked",
                    Arc::strong_count(&self.context) - 1
                ),
            }

            // 5. Messenger, device, instance
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
                crate::debug::cleanup_debug_config();
            }
            self.context.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
