// Lua scripts run by RedisStore. Each one executes atomically on the server.
//
// Lock keys in SCAN_AND_LOCK are derived inside the script rather than passed
// in KEYS, so these scripts target standalone or sentinel-managed Redis, not
// Redis Cluster.

// Walk the sorted set page by page and lock the first free member.
//
// KEYS[1]: sorted set (job registry)
// ARGV[1]: lock key prefix
// ARGV[2]: owner token
// ARGV[3]: lock TTL in milliseconds
//
// Returns {member, score} or nil after a full cursor cycle.
//
// Effect replication lets the script write after ZSCAN on Redis 3.2 to 4.x.
// Redis 5+ replicates effects already and 7+ treats the call as a no-op.
pub(crate) const SCAN_AND_LOCK: &str = r#"
redis.replicate_commands()
local cursor = '0'
repeat
    local page = redis.call('ZSCAN', KEYS[1], cursor)
    cursor = page[1]
    local entries = page[2]
    for i = 1, #entries, 2 do
        if redis.call('SET', ARGV[1] .. entries[i], ARGV[2], 'NX', 'PX', ARGV[3]) then
            return {entries[i], entries[i + 1]}
        end
    end
until cursor == '0'
return false
"#;

// KEYS[1]: lock key, ARGV[1]: owner token. Returns 1 if deleted.
pub(crate) const CAS_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

// KEYS[1]: lock key, ARGV[1]: owner token, ARGV[2]: TTL in milliseconds.
// Returns 1 if the TTL was reset.
pub(crate) const EXPIRE_IF_EQUAL: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

// KEYS[1]: sorted set, ARGV[1]: member, ARGV[2]: expected score.
// ZSCORE is an exact member lookup, so names containing glob characters are safe.
// Returns 1 if removed.
pub(crate) const ZREM_IF_SCORE: &str = r#"
local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
if score and tonumber(score) == tonumber(ARGV[2]) then
    return redis.call('ZREM', KEYS[1], ARGV[1])
end
return 0
"#;
