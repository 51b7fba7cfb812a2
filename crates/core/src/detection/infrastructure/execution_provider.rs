/// Return the preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU when none of these can be registered.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(all(not(target_os = "macos"), feature = "cuda"))]
    {
        vec![ort::execution_providers::CUDAExecutionProvider::default().build()]
    }
    #[cfg(all(not(target_os = "macos"), not(feature = "cuda")))]
    {
        vec![]
    }
}
