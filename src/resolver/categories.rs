//! Static mapping from userspace tracing categories to kernel events.
//!
//! Downstream decoders key on these exact group/event names. Entries that
//! name a whole group expand to every event the catalog knows for it; the
//! explicit events listed next to a group are kept so they are requested
//! even when the catalog has never seen the group.

/// One kernel-side entry of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryEvent {
    /// Every catalog event of the group.
    Group(&'static str),
    /// A single event.
    Event(&'static str, &'static str),
}

/// A named category and the kernel events it expands to.
#[derive(Debug)]
pub struct Category {
    pub name: &'static str,
    pub events: &'static [CategoryEvent],
}

use CategoryEvent::{Event, Group};

/// Marker events written by the userspace helper land in this event.
pub const ATRACE_MARKER_EVENT: (&str, &str) = ("ftrace", "print");

pub static CATEGORIES: &[Category] = &[
    Category {
        name: "gfx",
        events: &[
            Group("mdss"),
            Event("mdss", "rotator_bw_ao_as_context"),
            Event("mdss", "mdp_trace_counter"),
            Event("mdss", "tracing_mark_write"),
            Event("mdss", "mdp_cmd_wait_pingpong"),
            Event("mdss", "mdp_cmd_kickoff"),
            Event("mdss", "mdp_cmd_release_bw"),
            Event("mdss", "mdp_cmd_readptr_done"),
            Event("mdss", "mdp_cmd_pingpong_done"),
            Event("mdss", "mdp_misr_crc"),
            Event("mdss", "mdp_compare_bw"),
            Event("mdss", "mdp_perf_update_bus"),
            Event("mdss", "mdp_video_underrun_done"),
            Event("mdss", "mdp_commit"),
            Event("mdss", "mdp_mixer_update"),
            Event("mdss", "mdp_perf_prefill_calc"),
            Event("mdss", "mdp_perf_set_ot"),
            Event("mdss", "mdp_perf_set_wm_levels"),
            Event("mdss", "mdp_perf_set_panic_luts"),
            Event("mdss", "mdp_perf_set_qos_luts"),
            Event("mdss", "mdp_sspp_change"),
            Event("mdss", "mdp_sspp_set"),
            Group("mali"),
            Event("mali", "tracing_mark_write"),
            Group("sde"),
            Event("sde", "tracing_mark_write"),
            Event("sde", "sde_perf_update_bus"),
            Event("sde", "sde_perf_set_qos_luts"),
            Event("sde", "sde_perf_set_ot"),
            Event("sde", "sde_perf_set_danger_luts"),
            Event("sde", "sde_perf_crtc_update"),
            Event("sde", "sde_perf_calc_crtc"),
            Event("sde", "sde_evtlog"),
            Event("sde", "sde_encoder_underrun"),
            Event("sde", "sde_cmd_release_bw"),
            Group("dpu"),
            Event("dpu", "tracing_mark_write"),
            Group("g2d"),
            Event("g2d", "tracing_mark_write"),
            Event("g2d", "g2d_perf_update_qos"),
        ],
    },
    Category {
        name: "ion",
        events: &[Event("kmem", "ion_alloc_buffer_start")],
    },
    // sched_wakeup is left out on purpose: it is high volume and mostly
    // redundant with sched_waking. It can still be requested explicitly.
    Category {
        name: "sched",
        events: &[
            Event("sched", "sched_switch"),
            Event("sched", "sched_waking"),
            Event("sched", "sched_blocked_reason"),
            Event("sched", "sched_cpu_hotplug"),
            Event("sched", "sched_pi_setprio"),
            Event("sched", "sched_process_exit"),
            Group("cgroup"),
            Event("cgroup", "cgroup_transfer_tasks"),
            Event("cgroup", "cgroup_setup_root"),
            Event("cgroup", "cgroup_rmdir"),
            Event("cgroup", "cgroup_rename"),
            Event("cgroup", "cgroup_remount"),
            Event("cgroup", "cgroup_release"),
            Event("cgroup", "cgroup_mkdir"),
            Event("cgroup", "cgroup_destroy_root"),
            Event("cgroup", "cgroup_attach_task"),
            Event("oom", "oom_score_adj_update"),
            Event("task", "task_rename"),
            Event("task", "task_newtask"),
            Group("systrace"),
            Event("systrace", "0"),
            Group("scm"),
            Event("scm", "scm_call_start"),
            Event("scm", "scm_call_end"),
        ],
    },
    Category {
        name: "irq",
        events: &[
            Group("irq"),
            Event("irq", "tasklet_hi_exit"),
            Event("irq", "tasklet_hi_entry"),
            Event("irq", "tasklet_exit"),
            Event("irq", "tasklet_entry"),
            Event("irq", "softirq_raise"),
            Event("irq", "softirq_exit"),
            Event("irq", "softirq_entry"),
            Event("irq", "irq_handler_exit"),
            Event("irq", "irq_handler_entry"),
            Group("ipi"),
            Event("ipi", "ipi_raise"),
            Event("ipi", "ipi_exit"),
            Event("ipi", "ipi_entry"),
        ],
    },
    Category {
        name: "irqoff",
        events: &[
            Event("preemptirq", "irq_enable"),
            Event("preemptirq", "irq_disable"),
        ],
    },
    Category {
        name: "preemptoff",
        events: &[
            Event("preemptirq", "preempt_enable"),
            Event("preemptirq", "preempt_disable"),
        ],
    },
    Category {
        name: "i2c",
        events: &[
            Group("i2c"),
            Event("i2c", "i2c_read"),
            Event("i2c", "i2c_write"),
            Event("i2c", "i2c_result"),
            Event("i2c", "i2c_reply"),
            Event("i2c", "smbus_read"),
            Event("i2c", "smbus_write"),
            Event("i2c", "smbus_result"),
            Event("i2c", "smbus_reply"),
        ],
    },
    Category {
        name: "freq",
        events: &[
            Event("power", "cpu_frequency"),
            Event("power", "gpu_frequency"),
            Event("power", "clock_set_rate"),
            Event("power", "clock_disable"),
            Event("power", "clock_enable"),
            Event("clk", "clk_set_rate"),
            Event("clk", "clk_disable"),
            Event("clk", "clk_enable"),
            Event("power", "cpu_frequency_limits"),
            Event("power", "suspend_resume"),
            Event("cpuhp", "cpuhp_enter"),
            Event("cpuhp", "cpuhp_exit"),
            Event("cpuhp", "cpuhp_pause"),
            Group("msm_bus"),
            Event("msm_bus", "bus_update_request_end"),
            Event("msm_bus", "bus_update_request"),
            Event("msm_bus", "bus_rules_matches"),
            Event("msm_bus", "bus_max_votes"),
            Event("msm_bus", "bus_client_status"),
            Event("msm_bus", "bus_bke_params"),
            Event("msm_bus", "bus_bimc_config_limiter"),
            Event("msm_bus", "bus_avail_bw"),
            Event("msm_bus", "bus_agg_bw"),
        ],
    },
    Category {
        name: "membus",
        events: &[Group("memory_bus")],
    },
    Category {
        name: "idle",
        events: &[Event("power", "cpu_idle")],
    },
    Category {
        name: "disk",
        events: &[
            Event("f2fs", "f2fs_sync_file_enter"),
            Event("f2fs", "f2fs_sync_file_exit"),
            Event("f2fs", "f2fs_write_begin"),
            Event("f2fs", "f2fs_write_end"),
            Event("ext4", "ext4_da_write_begin"),
            Event("ext4", "ext4_da_write_end"),
            Event("ext4", "ext4_sync_file_enter"),
            Event("ext4", "ext4_sync_file_exit"),
            Event("block", "block_rq_issue"),
            Event("block", "block_rq_complete"),
        ],
    },
    Category {
        name: "mmc",
        events: &[Group("mmc")],
    },
    Category {
        name: "load",
        events: &[Group("cpufreq_interactive")],
    },
    // Fences moved group twice: sync (< 4.9), fence (4.9), dma_fence (> 4.9).
    Category {
        name: "sync",
        events: &[
            Group("sync"),
            Event("sync", "sync_pt"),
            Event("sync", "sync_timeline"),
            Event("sync", "sync_wait"),
            Group("fence"),
            Event("fence", "fence_annotate_wait_on"),
            Event("fence", "fence_destroy"),
            Event("fence", "fence_emit"),
            Event("fence", "fence_enable_signal"),
            Event("fence", "fence_init"),
            Event("fence", "fence_signaled"),
            Event("fence", "fence_wait_end"),
            Event("fence", "fence_wait_start"),
            Group("dma_fence"),
        ],
    },
    Category {
        name: "workq",
        events: &[
            Group("workqueue"),
            Event("workqueue", "workqueue_queue_work"),
            Event("workqueue", "workqueue_execute_start"),
            Event("workqueue", "workqueue_execute_end"),
            Event("workqueue", "workqueue_activate_work"),
        ],
    },
    Category {
        name: "memreclaim",
        events: &[
            Event("vmscan", "mm_vmscan_direct_reclaim_begin"),
            Event("vmscan", "mm_vmscan_direct_reclaim_end"),
            Event("vmscan", "mm_vmscan_kswapd_wake"),
            Event("vmscan", "mm_vmscan_kswapd_sleep"),
            Group("lowmemorykiller"),
            Event("lowmemorykiller", "lowmemory_kill"),
        ],
    },
    Category {
        name: "regulators",
        events: &[
            Group("regulator"),
            Event("regulator", "regulator_set_voltage_complete"),
            Event("regulator", "regulator_set_voltage"),
            Event("regulator", "regulator_enable_delay"),
            Event("regulator", "regulator_enable_complete"),
            Event("regulator", "regulator_enable"),
            Event("regulator", "regulator_disable_complete"),
            Event("regulator", "regulator_disable"),
        ],
    },
    Category {
        name: "binder_driver",
        events: &[
            Event("binder", "binder_transaction"),
            Event("binder", "binder_transaction_received"),
            Event("binder", "binder_transaction_alloc_buf"),
            Event("binder", "binder_set_priority"),
        ],
    },
    Category {
        name: "binder_lock",
        events: &[
            Event("binder", "binder_lock"),
            Event("binder", "binder_locked"),
            Event("binder", "binder_unlock"),
        ],
    },
    Category {
        name: "pagecache",
        events: &[
            Group("filemap"),
            Event("filemap", "mm_filemap_delete_from_page_cache"),
            Event("filemap", "mm_filemap_add_to_page_cache"),
            Event("filemap", "filemap_set_wb_err"),
            Event("filemap", "file_check_and_advance_wb_err"),
        ],
    },
    Category {
        name: "memory",
        events: &[
            Event("kmem", "rss_stat"),
            Event("kmem", "ion_heap_grow"),
            Event("kmem", "ion_heap_shrink"),
            // Supersedes ion_heap_grow/shrink from kernel 4.19.
            Event("ion", "ion_stat"),
            Event("mm_event", "mm_event_record"),
            Event("dmabuf_heap", "dma_heap_stat"),
        ],
    },
    Category {
        name: "thermal",
        events: &[
            Event("thermal", "thermal_temperature"),
            Event("thermal", "cdev_update"),
        ],
    },
];

/// Look up a category by name.
pub fn lookup(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.name == name)
}
