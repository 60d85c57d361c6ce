/// Progress hooks for batched downloads. All fields are optional; drivers
/// fill in what their UI can render. Callbacks are invoked from the thread
/// running the operation.
#[derive(Default)]
pub struct DownloadCallbacks {
    pub on_batch_start: Option<Box<dyn Fn(usize)>>,
    /// `(filename, index, total)`
    pub on_file_start: Option<Box<dyn Fn(&str, usize, usize)>>,
    /// `(bytes_done, bytes_total)`; total absent without a Content-Length.
    pub on_file_progress: Option<Box<dyn Fn(u64, Option<u64>)>>,
    /// `(filename, ok, error)`
    pub on_file_complete: Option<Box<dyn Fn(&str, bool, Option<&str>)>>,
    /// `(succeeded, total)`
    pub on_batch_complete: Option<Box<dyn Fn(usize, usize)>>,
}

impl std::fmt::Debug for DownloadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCallbacks").finish()
    }
}

/// Progress hooks for node installation batches.
#[derive(Default)]
pub struct NodeInstallCallbacks {
    pub on_batch_start: Option<Box<dyn Fn(usize)>>,
    /// `(node_name, index, total)`
    pub on_node_start: Option<Box<dyn Fn(&str, usize, usize)>>,
    /// `(node_name, ok, error)`
    pub on_node_complete: Option<Box<dyn Fn(&str, bool, Option<&str>)>>,
}

impl std::fmt::Debug for NodeInstallCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstallCallbacks").finish()
    }
}
