pub mod shared {
    pub mod cancellation;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod region;
}

pub mod capture {
    pub mod domain {
        pub mod camera_device;
        pub mod camera_settings;
    }
    pub mod frame_slot;
    pub mod frame_source;
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod detection_params;
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod audio {
    pub mod domain {
        pub mod recorder_command;
        pub mod restart_policy;
        pub mod status_sink;
    }
    pub mod audio_supervisor;
    pub mod infrastructure;
    pub mod recorder_handle;
}

pub mod display {
    pub mod domain {
        pub mod frame_display;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod detection_pipeline;
    pub mod fps_counter;
    pub mod overlay;
    pub mod pipeline_logger;
}

pub mod session {
    pub mod coordinator;
    pub mod interrupt;
    pub mod isolated_process;
    pub mod session_error;
}

pub mod platform {
    pub mod performance;
}
