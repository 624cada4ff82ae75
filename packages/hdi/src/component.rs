//! Component, manager and callback interfaces.

use std::sync::Arc;

use crate::{
    CodecCommand, CodecCompCapability, CodecEvent, HdiError, HdiResult, OmxCodecBuffer, OmxParam,
    OmxState, Param, PortIndex,
};

/// Receives asynchronous notifications from a component.
///
/// Called on a driver thread. Implementations must only hand the data off
/// (for example to a message queue) and return.
pub trait ComponentCallback: Send + Sync {
    /// A command completed, an error happened or a port changed.
    fn event_handler(&self, event: CodecEvent);

    /// The component finished reading an input buffer.
    fn empty_buffer_done(&self, app_data: i64, buffer: &OmxCodecBuffer);

    /// The component finished writing an output buffer.
    fn fill_buffer_done(&self, app_data: i64, buffer: &OmxCodecBuffer);
}

/// A hardware codec component instance.
///
/// Commands complete asynchronously through [`ComponentCallback`]; all other
/// calls are synchronous and expected to return quickly.
pub trait Component: Send + Sync {
    /// Start a state change, flush or port enable/disable.
    fn send_command(&self, cmd: CodecCommand) -> HdiResult;

    /// Current component state.
    fn get_state(&self) -> HdiResult<OmxState>;

    /// Read the parameter named by `query`'s kind and port.
    fn get_parameter(&self, query: Param) -> HdiResult<Param>;

    fn set_parameter(&self, param: Param) -> HdiResult;

    /// Read a runtime config named by `query`'s kind and port.
    fn get_config(&self, query: Param) -> HdiResult<Param>;

    fn set_config(&self, param: Param) -> HdiResult;

    /// Register a buffer on `port`. The returned descriptor carries the
    /// component-assigned `buffer_id`.
    fn use_buffer(&self, port: PortIndex, buffer: OmxCodecBuffer) -> HdiResult<OmxCodecBuffer>;

    /// Unregister a buffer.
    fn free_buffer(&self, port: PortIndex, buffer: &OmxCodecBuffer) -> HdiResult;

    /// Hand a filled input buffer to the component.
    fn empty_this_buffer(&self, buffer: &OmxCodecBuffer) -> HdiResult;

    /// Hand an empty output buffer to the component.
    fn fill_this_buffer(&self, buffer: &OmxCodecBuffer) -> HdiResult;
}

/// Enumerates and instantiates components.
pub trait ComponentManager: Send + Sync {
    /// Capabilities of every component the driver offers.
    fn component_capability_list(&self) -> HdiResult<Vec<CodecCompCapability>>;

    /// Create an instance of the component called `name`.
    ///
    /// Returns the component and its id for [`ComponentManager::destroy_component`].
    /// Fails with [`HdiError::InstanceLimit`] once the component's
    /// `max_inst` live instances exist.
    fn create_component(
        &self,
        name: &str,
        app_data: i64,
        callback: Arc<dyn ComponentCallback>,
    ) -> HdiResult<(Arc<dyn Component>, u32)>;

    fn destroy_component(&self, component_id: u32) -> HdiResult;
}

/// Typed parameter access on top of [`Component`].
pub trait ComponentExt {
    /// Read the parameter of `query`'s kind and port.
    fn get_param<T: OmxParam>(&self, query: T) -> HdiResult<T>;

    fn set_param<T: OmxParam>(&self, param: &T) -> HdiResult;

    /// Read the config of `query`'s kind and port.
    fn get_cfg<T: OmxParam>(&self, query: T) -> HdiResult<T>;

    fn set_cfg<T: OmxParam>(&self, param: &T) -> HdiResult;
}

impl<C: Component + ?Sized> ComponentExt for C {
    fn get_param<T: OmxParam>(&self, query: T) -> HdiResult<T> {
        let param = self.get_parameter(query.into_param())?;
        T::from_param(param).ok_or(HdiError::InvalidParam)
    }

    fn set_param<T: OmxParam>(&self, param: &T) -> HdiResult {
        self.set_parameter(param.clone().into_param())
    }

    fn get_cfg<T: OmxParam>(&self, query: T) -> HdiResult<T> {
        let param = self.get_config(query.into_param())?;
        T::from_param(param).ok_or(HdiError::InvalidParam)
    }

    fn set_cfg<T: OmxParam>(&self, param: &T) -> HdiResult {
        self.set_config(param.clone().into_param())
    }
}
