use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "board": {
                "type": "object",
                "properties": {
                    "state_file": { "type": "string" },
                    "seed": {
                        "type": "object",
                        "properties": {
                            "collective_goal": { "type": "string" },
                            "missions": { "type": "array", "items": { "$ref": "#/$defs/mission" } },
                            "viewer_missions": { "type": "array", "items": { "$ref": "#/$defs/mission" } }
                        }
                    }
                }
            },
            "supervisor": {
                "type": "object",
                "properties": {
                    "game_host": { "type": "string" },
                    "game_port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "base_port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "dry_run": { "type": "boolean" },
                    "entrypoint": { "type": "string" },
                    "interpreter": { "type": "string" },
                    "working_dir": { "type": "string" },
                    "max_logs": { "type": "integer", "minimum": 1 },
                    "proxy_timeout_ms": { "type": "integer", "minimum": 1 },
                    "chat_whitelist": { "type": "string" },
                    "respawn": {
                        "type": "object",
                        "properties": {
                            "max_attempts": { "type": "integer", "minimum": 0 },
                            "delay_step_ms": { "type": "integer", "minimum": 0 },
                            "max_delay_ms": { "type": "integer", "minimum": 0 },
                            "stability_window_ms": { "type": "integer", "minimum": 0 }
                        }
                    }
                }
            },
            "agents": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["team", "name"],
                    "properties": {
                        "team": { "type": "string", "minLength": 1 },
                        "name": { "type": "string", "minLength": 1 },
                        "role": { "type": "string" },
                        "display_name": { "type": "string" },
                        "login_name": { "type": "string", "maxLength": 16 },
                        "soul": { "type": "string" },
                        "self_hosted": { "type": "boolean" }
                    }
                }
            }
        },
        "$defs": {
            "mission": {
                "type": "object",
                "required": ["task"],
                "properties": {
                    "id": { "type": "string" },
                    "task": { "type": "string" },
                    "priority": { "type": "string", "enum": ["low", "normal", "high"] },
                    "status": { "type": "string", "enum": ["open", "in_progress", "done", "blocked", "failed"] },
                    "depends_on": { "type": "array", "items": { "type": "string" } }
                }
            }
        }
    })
});
