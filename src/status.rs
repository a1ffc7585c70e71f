//! Read-only pretty-printed status text combining `Config` and `Stats`,
//! matching the layout of the original's proc-file status surface.

use crate::config::Config;
use crate::stats::StatsSnapshot;

pub fn render(cfg: &Config, stats: &StatsSnapshot) -> String {
    let mut out = String::new();
    out.push_str("ull-fastpath status\n");
    out.push_str("-------------------\n");
    out.push_str(&format!("enabled:          {}\n", cfg.enabled));
    out.push_str(&format!("target:           {}:{}\n", cfg.target_ip, cfg.target_port));
    out.push_str(&format!("protocol:         {:?}\n", cfg.protocol));
    out.push_str(&format!("response:         {}:{}\n", cfg.response_ip, cfg.response_port));
    out.push_str(&format!(
        "multicast:        {}{}\n",
        cfg.multicast,
        if cfg.multicast { format!(" ({})", cfg.multicast_group) } else { String::new() }
    ));
    out.push_str("\n");
    out.push_str(&format!("packets_processed:   {}\n", stats.packets_processed));
    out.push_str(&format!("packets_bypassed:    {}\n", stats.packets_bypassed));
    out.push_str(&format!("responses_sent:      {}\n", stats.responses_sent));
    out.push_str(&format!("errors:              {}\n", stats.errors));
    out.push_str(&format!("connections_active:  {}\n", stats.connections_active));
    out.push_str(&format!("connections_dropped: {}\n", stats.connections_dropped));
    out.push_str(&format!("last_latency_ns:     {}\n", stats.last_latency_ns));
    out.push_str(&format!("min_latency_ns:      {}\n", stats.min_latency_ns));
    out.push_str(&format!("max_latency_ns:      {}\n", stats.max_latency_ns));
    out.push_str(&format!("avg_latency_ns:      {}\n", stats.avg_latency_ns));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_config_and_stats_fields() {
        let cfg = Config::default();
        let stats = StatsSnapshot::default();
        let text = render(&cfg, &stats);
        assert!(text.contains("enabled:          false"));
        assert!(text.contains("packets_processed:   0"));
    }
}
