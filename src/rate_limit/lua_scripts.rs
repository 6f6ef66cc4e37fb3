/// Lua script for token bucket rate limiting in Redis
///
/// Refill, consumption test and write-back run as one server-side step, so
/// concurrent callers on the same key are serialized by Redis itself.
///
/// KEYS[1] = the bucket key
/// ARGV[1] = capacity (limit)
/// ARGV[2] = window duration (seconds)
/// ARGV[3] = current timestamp (fractional seconds)
/// ARGV[4] = "1" to consume a token, "0" to only observe
/// ARGV[5] = TTL applied on write (seconds)
///
/// Returns: [allowed ("0"/"1"), tokens left]
pub const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local consume = ARGV[4] == '1'
local ttl = tonumber(ARGV[5])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])

-- A missing bucket starts full
if tokens == nil or last_refill == nil then
    tokens = limit
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(limit, tokens + elapsed * (limit / window))
tokens = math.max(0, tokens)
last_refill = math.max(last_refill, now)

local allowed = 0
if tokens >= 1 then
    allowed = 1
    if consume then
        tokens = tokens - 1
    end
end

if consume then
    redis.call('HSET', key,
        'tokens', string.format('%.17g', tokens),
        'last_refill', string.format('%.17g', last_refill))
    redis.call('EXPIRE', key, ttl)
end

return {tostring(allowed), string.format('%.17g', tokens)}
"#;

/// Lua script for sliding window log rate limiting
///
/// The log is a sorted set scored by request time in milliseconds. Members
/// carry a caller-generated unique suffix so same-millisecond arrivals are
/// recorded separately.
///
/// KEYS[1] = the log key
/// ARGV[1] = maximum requests
/// ARGV[2] = current timestamp (milliseconds)
/// ARGV[3] = window start (milliseconds); entries strictly older are pruned
/// ARGV[4] = member to record
/// ARGV[5] = "1" to record the request, "0" to only observe
/// ARGV[6] = TTL applied on write (seconds)
///
/// Returns: [allowed ("0"/"1"), entries in log, oldest score or ""]
pub const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local now = ARGV[2]
local window_start = ARGV[3]
local member = ARGV[4]
local consume = ARGV[5] == '1'
local ttl = tonumber(ARGV[6])

-- Exclusive bound: an entry exactly at window_start is still counted
redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. window_start)

local count = redis.call('ZCARD', key)

local allowed = 0
if count < limit then
    allowed = 1
    if consume then
        redis.call('ZADD', key, now, member)
        count = count + 1
    end
end

if consume and count > 0 then
    redis.call('EXPIRE', key, ttl)
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = ''
if oldest[2] then
    oldest_score = oldest[2]
end

return {tostring(allowed), tostring(count), oldest_score}
"#;
