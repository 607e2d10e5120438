pub(super) fn default_name() -> String {
    "Disparo".to_string()
}

pub(super) fn default_data_dir() -> String {
    "~/.disparo".to_string()
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_status_url() -> String {
    "https://aplicativos-n8n.wip173.easypanel.host/webhook/dispradorlogin".to_string()
}

pub(super) fn default_login_url() -> String {
    "https://aplicativos-n8n.wip173.easypanel.host/webhook/login-app".to_string()
}

pub(super) fn default_register_url() -> String {
    "https://aplicativos-n8n.wip173.easypanel.host/webhook/cadastrar-conta".to_string()
}

pub(super) fn default_instance_id() -> String {
    "instance-id-placeholder".to_string()
}

pub(super) fn default_timeout_secs() -> u64 {
    30
}

pub(super) fn default_poll_interval_ms() -> u64 {
    29_000
}

pub(super) fn default_stripe_base_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

pub(super) fn default_asaas_base_url() -> String {
    "https://www.asaas.com/api/v3".to_string()
}

pub(super) fn default_currency() -> String {
    "brl".to_string()
}

pub(super) fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

pub(super) fn default_api_port() -> u16 {
    3000
}
